use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::repository::OrderRepository;

/// Queue depth for expiry events.
const EXPIRY_QUEUE_DEPTH: usize = 256;

/// Hands expiry events to a single worker so that order expiry and order
/// completion serialize at the same atomic store operation.
#[derive(Clone)]
pub struct ExpiryScheduler {
    tx: mpsc::Sender<u64>,
}

impl ExpiryScheduler {
    /// Spawn the worker loop and return a scheduler connected to it.
    /// Requires a running tokio runtime.
    pub fn start(orders: Arc<dyn OrderRepository>) -> Self {
        let (tx, rx) = mpsc::channel(EXPIRY_QUEUE_DEPTH);
        tokio::spawn(run_expiry_worker(orders, rx));
        Self { tx }
    }

    /// After at least `delay`, the pending order with this memo is discarded
    /// if it still exists. Exactly one expiry is scheduled per call.
    pub fn schedule(&self, memo: u64, delay: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // A closed channel means the worker went down with the runtime.
            let _ = tx.send(memo).await;
        });
    }
}

async fn run_expiry_worker(orders: Arc<dyn OrderRepository>, mut rx: mpsc::Receiver<u64>) {
    info!("Expiry worker started");
    while let Some(memo) = rx.recv().await {
        match orders.remove_pending(memo).await {
            Ok(Some(order)) => {
                info!(memo, room_id = %order.room_id, "Pending order expired unpaid");
            }
            Ok(None) => {
                // Completed, or already expired. Losing this race is the
                // expected outcome, not an error.
                debug!(memo, "Expiry found no pending order");
            }
            Err(e) => warn!(memo, error = %e, "Expiry sweep failed"),
        }
    }
}
