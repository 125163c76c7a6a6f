//! Hand-off points to the asynchronous side of the broker.
//!
//! The broker persists an operation and then enqueues its ID; the workers
//! that execute operations live outside this crate. Label mutation on
//! account moves goes through [`Labeler`].

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("operation queue is closed")]
    Closed,
}

/// Accepts operation IDs for asynchronous processing.
pub trait Queue: Send + Sync {
    fn add(&self, operation_id: &str) -> Result<(), QueueError>;
}

/// In-process queue backed by an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelQueue {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Queue for ChannelQueue {
    fn add(&self, operation_id: &str) -> Result<(), QueueError> {
        debug!(operation = operation_id, "queueing operation");
        self.tx.send(operation_id.to_string()).map_err(|_| QueueError::Closed)
    }
}

/// Moves the global-account label of a runtime's resources.
#[async_trait]
pub trait Labeler: Send + Sync {
    async fn update_labels(&self, runtime_id: &str, global_account_id: &str) -> Result<(), String>;
}

/// Resolves the API server URL of a provisioned runtime.
pub trait ApiServerUrls: Send + Sync {
    /// `Ok(None)` when the runtime has no kubeconfig yet.
    fn server_url(&self, runtime_id: &str) -> Result<Option<String>, String>;
}
