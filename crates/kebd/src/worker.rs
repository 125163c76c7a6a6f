//! Consumer of the in-process operation queue.
//!
//! Provisioning itself runs elsewhere; this loop resolves each queued ID
//! against the store and reports it.

use std::sync::Arc;

use keb_state::{Operations, Store};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Drain `queue` until it closes or `shutdown` flips to true. Returns the
/// number of operations handled.
pub async fn run(
    mut queue: mpsc::UnboundedReceiver<String>,
    store: Arc<dyn Store>,
    mut shutdown: watch::Receiver<bool>,
) -> usize {
    let mut handled = 0;
    loop {
        tokio::select! {
            next = queue.recv() => {
                let Some(operation_id) = next else {
                    debug!("operation queue closed");
                    break;
                };
                handle(store.as_ref(), &operation_id);
                handled += 1;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!(handled, "operation worker stopped");
    handled
}

fn handle(store: &dyn Store, operation_id: &str) {
    match store.get_operation(operation_id) {
        Ok(Some(op)) => info!(
            operation = %op.id,
            instance = %op.instance_id,
            kind = ?op.kind,
            temporary = op.temporary,
            "operation received"
        ),
        Ok(None) => warn!(operation = operation_id, "queued operation not found"),
        Err(e) => error!(operation = operation_id, error = %e, "unable to read queued operation"),
    }
}
