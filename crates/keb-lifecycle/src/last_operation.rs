//! State of an instance's referenced or latest operation.

use keb_core::{BrokerError, BrokerResult};
use keb_state::{Operations, Store};
use std::sync::Arc;

use crate::collaborators::storage;
use crate::response::LastOperationResponse;

pub const OPERATION_NOT_FOUND: &str = "operation not found";

pub trait LastOperationReader: Send + Sync {
    fn last_operation(&self, instance_id: &str, operation_id: Option<&str>) -> BrokerResult<LastOperationResponse>;
}

pub struct LastOperationService {
    store: Arc<dyn Store>,
}

impl LastOperationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl LastOperationReader for LastOperationService {
    fn last_operation(&self, instance_id: &str, operation_id: Option<&str>) -> BrokerResult<LastOperationResponse> {
        let operation = match operation_id.filter(|id| !id.is_empty()) {
            Some(id) => self
                .store
                .get_operation(id)
                .map_err(storage("unable to get operation"))?
                .filter(|op| op.instance_id == instance_id),
            None => self
                .store
                .last_operation(instance_id)
                .map_err(storage("unable to get operation"))?,
        };
        let operation = operation.ok_or_else(|| BrokerError::not_found(OPERATION_NOT_FOUND))?;
        Ok(LastOperationResponse {
            operation_id: operation.id,
            state: operation.state,
            description: operation.description,
        })
    }
}
