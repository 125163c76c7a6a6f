//! Deprovisioning of an instance.

use async_trait::async_trait;
use keb_core::{BrokerError, BrokerResult};
use keb_state::{Instances, Operation, Operations};
use tracing::{info, warn};

use crate::collaborators::{Collaborators, storage};
use crate::provision::ASYNC_REQUIRED;
use crate::response::DeprovisionResponse;

pub const INSTANCE_NOT_FOUND: &str = "instance does not exist";

#[async_trait]
pub trait Deprovisioner: Send + Sync {
    async fn deprovision(&self, instance_id: &str, async_allowed: bool) -> BrokerResult<DeprovisionResponse>;
}

pub struct DeprovisionService {
    deps: Collaborators,
}

impl DeprovisionService {
    pub fn new(deps: Collaborators) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Deprovisioner for DeprovisionService {
    async fn deprovision(&self, instance_id: &str, async_allowed: bool) -> BrokerResult<DeprovisionResponse> {
        let store = &self.deps.store;
        let instance = store
            .get_instance(instance_id)
            .map_err(storage("unable to get instance"))?
            .ok_or_else(|| {
                warn!(instance = %instance_id, "deprovisioning of unknown instance");
                BrokerError::not_found(INSTANCE_NOT_FOUND)
            })?;
        if !async_allowed {
            return Err(BrokerError::unprocessable(ASYNC_REQUIRED));
        }

        let existing = store
            .deprovisioning_operation(instance_id)
            .map_err(storage("unable to get deprovisioning operation"))?;
        if let Some(op) = existing.filter(|op| !op.temporary && !op.state.is_terminal()) {
            info!(instance = %instance_id, operation = %op.id, "deprovisioning already in progress");
            return Ok(DeprovisionResponse { operation_id: op.id });
        }

        let operation = Operation::new_deprovisioning(instance_id, instance.parameters.clone(), false);
        let operation = store
            .insert_operation(&operation)
            .map_err(storage("unable to save operation"))?;
        store
            .update_instance_last_operation(instance_id, &operation.id)
            .map_err(storage("unable to save instance"))?;
        self.deps.enqueue(&operation)?;
        info!(instance = %instance_id, operation = %operation.id, "deprovisioning started");
        Ok(DeprovisionResponse {
            operation_id: operation.id,
        })
    }
}
