//! redb table definitions for the broker state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).

use redb::TableDefinition;

/// Instances keyed by `{instance_id}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");

/// Operations keyed by `{operation_id}`.
pub const OPERATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("operations");

/// Archived instances keyed by `{instance_id}`.
pub const INSTANCES_ARCHIVED: TableDefinition<&str, &[u8]> =
    TableDefinition::new("instances_archived");

/// Audit actions keyed by `{instance_id}:{action_id}`.
pub const ACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("actions");

/// Shape shared by every table above.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;
