//! Startup and shutdown coordination.

use std::sync::atomic::Ordering;
use std::time::Duration;

use super::{Job, SHUTDOWN_TIMEOUT, TaskService, lock};
use crate::error::{Error, Result};
use crate::types::TaskStatus;

/// Interval between checks while waiting for running tasks to stop
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(50);

impl<J: Job> TaskService<J> {
    /// Start the queue processor and the event dispatcher
    ///
    /// Must be called from within a Tokio runtime. Calling it again while
    /// running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] once the service has been shut down.
    pub fn start(&self) -> Result<()> {
        if !self.inner.accepting_new.load(Ordering::SeqCst) || self.inner.shutdown.is_cancelled() {
            return Err(Error::ShuttingDown);
        }
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut handles = lock(&self.inner.handles);
        handles.push(self.inner.start_queue_processor());
        if let Some(dispatcher) = self
            .inner
            .events
            .spawn_dispatcher(self.inner.shutdown.clone())
        {
            handles.push(dispatcher);
        }

        tracing::info!(kind = %J::KIND, workers = self.inner.workers, "task service started");
        Ok(())
    }

    /// Whether the worker pool is running
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Gracefully shut down the service
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new tasks
    /// 2. Cancels every PENDING task
    /// 3. Requests cancellation of every RUNNING task
    /// 4. Waits for running tasks to reach a terminal state (bounded at 30 seconds)
    /// 5. Stops the queue processor and drains pending events to handlers
    pub async fn shutdown(&self) {
        self.shutdown_with_timeout(SHUTDOWN_TIMEOUT).await;
    }

    /// [`shutdown`](Self::shutdown) with a custom bound on the wait for running tasks
    pub async fn shutdown_with_timeout(&self, wait: Duration) {
        tracing::info!(kind = %J::KIND, "Initiating graceful shutdown");

        // 1. Stop accepting new tasks
        self.inner.accepting_new.store(false, Ordering::SeqCst);

        // 2-3. Cancel everything that has not finished
        let unfinished: Vec<_> = self
            .inner
            .read_tasks()
            .iter()
            .filter(|(_, slot)| !slot.task.is_finished())
            .map(|(id, _)| *id)
            .collect();
        for id in &unfinished {
            self.inner.cancel(*id, "service shutting down");
        }
        tracing::debug!(kind = %J::KIND, count = unfinished.len(), "cancelled unfinished tasks");

        // 4. Wait for running tasks to observe cancellation
        match tokio::time::timeout(wait, self.wait_for_running()).await {
            Ok(()) => tracing::info!(kind = %J::KIND, "All running tasks stopped"),
            Err(_) => tracing::warn!(
                kind = %J::KIND,
                still_running = self.inner.running_count(),
                "Timeout waiting for running tasks, proceeding with shutdown"
            ),
        }

        // 5. Stop background loops
        self.inner.shutdown.cancel();
        let handles: Vec<_> = lock(&self.inner.handles).drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(kind = %J::KIND, error = %e, "background task ended abnormally");
            }
        }
        self.inner.running.store(false, Ordering::SeqCst);

        tracing::info!(kind = %J::KIND, "Graceful shutdown complete");
    }

    async fn wait_for_running(&self) {
        loop {
            let running = self.inner.running_count();
            if running == 0 {
                return;
            }
            tracing::debug!(kind = %J::KIND, running, "Waiting for running tasks to stop");
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
        }
    }

    /// Number of tasks currently held by a worker
    pub fn running_tasks(&self) -> usize {
        self.inner.running_count()
    }

    /// Whether any task is still PENDING
    pub fn has_pending(&self) -> bool {
        self.inner
            .read_tasks()
            .values()
            .any(|slot| slot.task.status == TaskStatus::Pending)
    }
}
