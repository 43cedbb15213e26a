//! Periodic expiry of old terminal tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::tasks::service::TaskQueueService;

/// Handle to the running expiry job. Runs are sequential and never overlap.
pub struct ExpirySweep {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ExpirySweep {
    /// Start sweeping every `interval`, deleting terminal tasks older than `retention`.
    ///
    /// The first sweep runs one full interval after start.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn spawn(service: Arc<TaskQueueService>, interval: Duration, retention: Duration) -> Self {
        assert!(!interval.is_zero(), "expiry sweep interval must be non-zero");
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = service.expire_old_tasks(retention).await;
                        tracing::debug!(removed, "Expiry sweep finished");
                    }
                }
            }
            tracing::debug!("Expiry sweep stopped");
        });

        tracing::info!(
            interval_secs = interval.as_secs(),
            retention_secs = retention.as_secs(),
            "Expiry sweep started"
        );
        Self { cancel, handle }
    }

    /// Stop the job and wait for an in-progress sweep to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Expiry sweep task failed");
        }
    }
}
