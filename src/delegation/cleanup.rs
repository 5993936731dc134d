//! Periodic conversation cleanup with an explicit stop handle.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::settings::MIN_CLEANUP_INTERVAL;

/// Handle to a running cleanup loop. Dropping it stops the loop; call
/// [`stop`](Self::stop) to also wait for the current pass to finish.
#[derive(Debug)]
pub struct CleanupTask {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CleanupTask {
    /// Runs `pass` every `period` until `cancel` fires. The first pass runs
    /// one full period after start. Periods below [`MIN_CLEANUP_INTERVAL`]
    /// are raised to it. Must be called inside a Tokio runtime.
    pub(crate) fn spawn<F, Fut>(period: Duration, cancel: CancellationToken, mut pass: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = usize> + Send,
    {
        if period < MIN_CLEANUP_INTERVAL {
            warn!(
                requested_ms = period.as_millis() as u64,
                "Cleanup interval below minimum, using {}s",
                MIN_CLEANUP_INTERVAL.as_secs()
            );
        }
        let period = period.max(MIN_CLEANUP_INTERVAL);
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            info!(interval_secs = period.as_secs_f64(), "Conversation cleanup started");
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let pruned = pass().await;
                        if pruned > 0 {
                            debug!(pruned, "Cleanup pass pruned stale conversations");
                        }
                    }
                }
            }
            info!("Conversation cleanup stopped");
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for CleanupTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
