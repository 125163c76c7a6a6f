//! Everything the orchestrators share.

use std::sync::Arc;

use keb_admission::AdmissionPipeline;
use keb_core::{BrokerConfig, BrokerError, BrokerResult};
use keb_state::{Operation, StateError, Store};
use tracing::{error, info};

use crate::labels::ResponseLabels;
use crate::queue::{Labeler, Queue};

/// Sent when an operation was persisted but could not be queued.
pub const QUEUE_FAILED: &str = "unable to queue the operation";

/// Collaborators of the provision, update and deprovision flows.
#[derive(Clone)]
pub struct Collaborators {
    pub config: Arc<BrokerConfig>,
    pub pipeline: Arc<AdmissionPipeline>,
    pub store: Arc<dyn Store>,
    pub queue: Arc<dyn Queue>,
    pub labeler: Arc<dyn Labeler>,
    pub labels: Arc<ResponseLabels>,
}

impl Collaborators {
    /// Queue a persisted operation. A failure leaves the operation stored but
    /// unprocessed, so it is fatal for the request.
    pub(crate) fn enqueue(&self, operation: &Operation) -> BrokerResult<()> {
        self.queue.add(&operation.id).map_err(|e| {
            error!(operation = %operation.id, instance = %operation.instance_id, error = %e, "unable to queue operation");
            BrokerError::internal(QUEUE_FAILED, e)
        })?;
        info!(operation = %operation.id, kind = ?operation.kind, "operation queued");
        Ok(())
    }
}

/// Map a store failure to a 500 with `message`, logging the cause.
pub(crate) fn storage(message: &'static str) -> impl FnOnce(StateError) -> BrokerError {
    move |e| {
        error!(error = %e, "{message}");
        BrokerError::internal(message, e)
    }
}
