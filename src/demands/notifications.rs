//! Fire-and-forget delivery of demand notifications.
//!
//! A mutation never waits for, nor rolls back on, notification delivery. Each batch
//! runs on its own task; failures are logged and dropped.

use async_trait::async_trait;
use scopeguard::guard;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::core::shared::store::StoreError;

use super::types::DemandNotification;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, batch: &[DemandNotification]) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    sink: Arc<dyn NotificationSink>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish()
    }
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Spawns delivery of `batch`. Empty batches spawn nothing.
    pub fn dispatch(&self, batch: Vec<DemandNotification>) -> Option<JoinHandle<()>> {
        if batch.is_empty() {
            return None;
        }

        let sink = Arc::clone(&self.sink);
        let in_flight = Arc::clone(&self.in_flight);
        let idle = Arc::clone(&self.idle);
        in_flight.fetch_add(1, Ordering::AcqRel);

        Some(tokio::spawn(async move {
            // runs on unwind too, so a panicking sink cannot stall `drain`
            let _done = guard((), move |_| {
                if in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
                    idle.notify_waiters();
                }
            });

            let count = batch.len();
            let demand_id = batch[0].demand_id;
            match sink.deliver(&batch).await {
                Ok(()) => log::debug!("Delivered {count} notification(s) for demand {demand_id}"),
                Err(e) => log::warn!(
                    "Failed to deliver {count} notification(s) for demand {demand_id}: {e}"
                ),
            }
        }))
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Waits until every spawned batch has finished. Used on shutdown and in tests.
    pub async fn drain(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}
