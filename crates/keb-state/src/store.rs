//! StateStore — redb-backed persistence for broker records.
//!
//! Implements the [`Instances`], [`Operations`], [`InstancesArchived`] and
//! [`Actions`] traits. All values are JSON-serialized into redb's `&[u8]`
//! value columns. The store supports both on-disk and in-memory backends
//! (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::repo::{Actions, Instances, InstancesArchived, Operations};
use crate::tables::*;
use crate::types::*;

/// `map_err!(Read)` builds a closure wrapping the error's message in that variant.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Broker record store on a shared redb database. Cheap to clone.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open the database file at `path`, creating it and its tables on first use.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "broker database opened");
        Ok(store)
    }

    /// Database that lives only as long as the store; used by tests.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory broker database opened");
        Ok(store)
    }

    /// Instances, operations, archive and actions tables.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.open_table(OPERATIONS).map_err(map_err!(Table))?;
        txn.open_table(INSTANCES_ARCHIVED).map_err(map_err!(Table))?;
        txn.open_table(ACTIONS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic helpers ────────────────────────────────────────────

    fn get_json<T: DeserializeOwned>(&self, def: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Insert `value` under `key`. With `must_be_new`, an existing key is an error.
    fn put_json<T: Serialize>(&self, def: JsonTable, key: &str, value: &T, must_be_new: bool) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            if must_be_new && table.get(key).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(key.to_string()));
            }
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Every record in a table that satisfies `keep`.
    fn scan<T: DeserializeOwned>(&self, def: JsonTable, keep: impl Fn(&T) -> bool) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: T = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if keep(&record) {
                results.push(record);
            }
        }
        Ok(results)
    }

    fn latest_operation(
        &self,
        instance_id: &str,
        kind: Option<OperationKind>,
    ) -> StateResult<Option<Operation>> {
        let ops = self.scan(OPERATIONS, |op: &Operation| {
            op.instance_id == instance_id && kind.is_none_or(|k| op.kind == k)
        })?;
        Ok(ops.into_iter().max_by_key(|op| (op.sequence, op.created_at)))
    }
}

// ── Instances ──────────────────────────────────────────────────────

impl Instances for StateStore {
    fn insert_instance(&self, instance: &Instance) -> StateResult<()> {
        self.put_json(INSTANCES, &instance.instance_id, instance, true)?;
        debug!(instance = %instance.instance_id, "instance stored");
        Ok(())
    }

    fn get_instance(&self, instance_id: &str) -> StateResult<Option<Instance>> {
        self.get_json(INSTANCES, instance_id)
    }

    fn update_instance(&self, instance: &Instance) -> StateResult<Instance> {
        let key = instance.instance_id.as_str();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            let stored: Instance = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                None => return Err(StateError::NotFound(key.to_string())),
            };
            if stored.version != instance.version {
                return Err(StateError::Conflict {
                    key: key.to_string(),
                    stored: stored.version,
                    given: instance.version,
                });
            }
            let mut next = instance.clone();
            next.version = stored.version + 1;
            next.updated_at = Utc::now();
            let bytes = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
            table.insert(key, bytes.as_slice()).map_err(map_err!(Write))?;
            updated = next;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(instance = %key, version = updated.version, "instance updated");
        Ok(updated)
    }

    fn update_instance_last_operation(&self, instance_id: &str, operation_id: &str) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            let mut stored: Instance = match table.get(instance_id).map_err(map_err!(Read))? {
                Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                None => return Err(StateError::NotFound(instance_id.to_string())),
            };
            stored.last_operation_id = operation_id.to_string();
            stored.version += 1;
            stored.updated_at = Utc::now();
            let bytes = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
            table
                .insert(instance_id, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn list_instances(&self, filter: &InstanceFilter) -> StateResult<Vec<Instance>> {
        let mut instances = self.scan(INSTANCES, |i: &Instance| filter.matches(i))?;
        if !filter.states.is_empty() {
            let mut kept = Vec::with_capacity(instances.len());
            for instance in instances {
                let op: Option<Operation> = self.get_json(OPERATIONS, &instance.last_operation_id)?;
                if op.is_some_and(|op| filter.states.contains(&op.state)) {
                    kept.push(instance);
                }
            }
            instances = kept;
        }
        instances.sort_by_key(|i| i.created_at);
        Ok(instances)
    }
}

// ── Operations ─────────────────────────────────────────────────────

impl Operations for StateStore {
    fn insert_operation(&self, operation: &Operation) -> StateResult<Operation> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored;
        {
            let mut table = txn.open_table(OPERATIONS).map_err(map_err!(Table))?;
            if table.get(operation.id.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(operation.id.clone()));
            }
            let mut max_seq = 0;
            for entry in table.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let op: Operation = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if op.instance_id == operation.instance_id {
                    max_seq = max_seq.max(op.sequence);
                }
            }
            let mut next = operation.clone();
            next.sequence = max_seq + 1;
            let bytes = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
            table
                .insert(next.id.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
            stored = next;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(operation = %stored.id, instance = %stored.instance_id, kind = ?stored.kind, "operation stored");
        Ok(stored)
    }

    fn update_operation(&self, operation: &Operation) -> StateResult<()> {
        if self.get_operation(&operation.id)?.is_none() {
            return Err(StateError::NotFound(operation.id.clone()));
        }
        let mut next = operation.clone();
        next.updated_at = Utc::now();
        self.put_json(OPERATIONS, &operation.id, &next, false)
    }

    fn get_operation(&self, operation_id: &str) -> StateResult<Option<Operation>> {
        self.get_json(OPERATIONS, operation_id)
    }

    fn provisioning_operation(&self, instance_id: &str) -> StateResult<Option<Operation>> {
        self.latest_operation(instance_id, Some(OperationKind::Provision))
    }

    fn deprovisioning_operation(&self, instance_id: &str) -> StateResult<Option<Operation>> {
        self.latest_operation(instance_id, Some(OperationKind::Deprovision))
    }

    fn last_operation(&self, instance_id: &str) -> StateResult<Option<Operation>> {
        self.latest_operation(instance_id, None)
    }

    fn list_operations(&self, instance_id: &str) -> StateResult<Vec<Operation>> {
        let mut ops = self.scan(OPERATIONS, |op: &Operation| op.instance_id == instance_id)?;
        ops.sort_by_key(|op| (op.sequence, op.created_at));
        Ok(ops)
    }
}

// ── Archive ────────────────────────────────────────────────────────

impl InstancesArchived for StateStore {
    fn insert_archived(&self, archived: &InstanceArchived) -> StateResult<()> {
        self.put_json(INSTANCES_ARCHIVED, &archived.instance_id, archived, true)
    }

    fn count_archived_for_global_account(&self, global_account_id: &str, plan_id: &str) -> StateResult<usize> {
        let found = self.scan(INSTANCES_ARCHIVED, |a: &InstanceArchived| {
            a.global_account_id == global_account_id
                && a.plan_id == plan_id
                && a.provisioning_state == OperationState::Succeeded
        })?;
        Ok(found.len())
    }
}

// ── Actions ────────────────────────────────────────────────────────

impl Actions for StateStore {
    fn insert_action(&self, action: &Action) -> StateResult<()> {
        self.put_json(ACTIONS, &action.table_key(), action, true)?;
        debug!(instance = %action.instance_id, kind = ?action.kind, "action stored");
        Ok(())
    }

    fn list_actions(&self, instance_id: &str) -> StateResult<Vec<Action>> {
        let prefix = format!("{instance_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ACTIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let action: Action = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(action);
            }
        }
        results.sort_by_key(|a| a.created_at);
        Ok(results)
    }
}
