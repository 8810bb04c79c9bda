//! Delayed re-enqueueing of execution tasks.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::operation::SyncTask;

/// Puts tasks back on the execution queue after a fixed delay.
///
/// Each retry waits on its own timer, so the execution loop keeps draining
/// the queue meanwhile. Pending retries are dropped on shutdown; their
/// records stay flagged in the store.
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    delay: Duration,
    queue: UnboundedSender<SyncTask>,
    shutdown: CancellationToken,
}

impl RetryScheduler {
    pub fn new(delay: Duration, queue: UnboundedSender<SyncTask>, shutdown: CancellationToken) -> Self {
        Self {
            delay,
            queue,
            shutdown,
        }
    }

    /// Configured delay.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Re-enqueue `task` once the delay has elapsed.
    pub fn schedule(&self, task: SyncTask) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = scheduler.shutdown.cancelled() => {
                    debug!(source_id = task.source_id, operation = %task.operation, "Retry dropped on shutdown");
                }
                () = tokio::time::sleep(scheduler.delay) => {
                    if scheduler.queue.send(task).is_err() {
                        debug!(source_id = task.source_id, "Execution queue closed; retry dropped");
                    }
                }
            }
        });
    }
}
