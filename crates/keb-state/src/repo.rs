//! Store interfaces consumed by the lifecycle engine.

use crate::error::StateResult;
use crate::types::*;

pub trait Instances: Send + Sync {
    /// Insert a new instance. Fails if the ID is taken.
    fn insert_instance(&self, instance: &Instance) -> StateResult<()>;

    fn get_instance(&self, instance_id: &str) -> StateResult<Option<Instance>>;

    /// Write `instance` if its `version` still matches the stored one, and
    /// return the stored copy with the bumped version.
    fn update_instance(&self, instance: &Instance) -> StateResult<Instance>;

    fn update_instance_last_operation(&self, instance_id: &str, operation_id: &str) -> StateResult<()>;

    fn list_instances(&self, filter: &InstanceFilter) -> StateResult<Vec<Instance>>;
}

pub trait Operations: Send + Sync {
    /// Insert a new operation; the store assigns its `sequence`.
    fn insert_operation(&self, operation: &Operation) -> StateResult<Operation>;

    fn update_operation(&self, operation: &Operation) -> StateResult<()>;

    fn get_operation(&self, operation_id: &str) -> StateResult<Option<Operation>>;

    /// Most recent provisioning operation of an instance.
    fn provisioning_operation(&self, instance_id: &str) -> StateResult<Option<Operation>>;

    /// Most recent deprovisioning operation of an instance.
    fn deprovisioning_operation(&self, instance_id: &str) -> StateResult<Option<Operation>>;

    fn last_operation(&self, instance_id: &str) -> StateResult<Option<Operation>>;

    /// All operations of an instance, oldest first.
    fn list_operations(&self, instance_id: &str) -> StateResult<Vec<Operation>>;
}

pub trait InstancesArchived: Send + Sync {
    fn insert_archived(&self, archived: &InstanceArchived) -> StateResult<()>;

    /// Archived instances of a plan in a global account whose provisioning
    /// succeeded.
    fn count_archived_for_global_account(&self, global_account_id: &str, plan_id: &str) -> StateResult<usize>;
}

pub trait Actions: Send + Sync {
    fn insert_action(&self, action: &Action) -> StateResult<()>;

    /// Actions of an instance, oldest first.
    fn list_actions(&self, instance_id: &str) -> StateResult<Vec<Action>>;
}

/// Everything the lifecycle engine needs from storage.
pub trait Store: Instances + Operations + InstancesArchived + Actions {}

impl<T: Instances + Operations + InstancesArchived + Actions> Store for T {}
