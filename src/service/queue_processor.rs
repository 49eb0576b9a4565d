//! Queue processor: hands pending tasks to the worker pool in priority order

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use super::job::JobContext;
use super::{Inner, Job, QUEUE_POLL_INTERVAL, lock};
use crate::types::TaskId;

impl<J: Job> Inner<J> {
    /// Spawn the loop that feeds the worker pool
    ///
    /// The loop:
    /// 1. Acquires a permit from the worker pool (at most `workers` tasks run at once)
    /// 2. Pops the highest-priority pending task, or waits for a submission
    /// 3. Spawns the task, which releases the permit when it ends
    /// 4. Repeats until shutdown
    ///
    /// The permit is taken before popping so a task submitted while the pool is
    /// busy can still overtake lower-priority ones already queued.
    pub(crate) fn start_queue_processor(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let inner = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                let permit = tokio::select! {
                    permit = Arc::clone(&inner.concurrent_limit).acquire_owned() => match permit {
                        Ok(p) => p,
                        // Pool closed
                        Err(_) => break,
                    },
                    _ = inner.shutdown.cancelled() => break,
                };

                let next = lock(&inner.queue).pop();
                match next {
                    Some(queued) => {
                        let worker = Arc::clone(&inner);
                        tokio::spawn(async move {
                            let _permit = permit;
                            worker.run_task(queued.id).await;
                        });
                    }
                    None => {
                        drop(permit);
                        // Queue is empty, wait for a submission (or poll again)
                        tokio::select! {
                            _ = inner.queue_notify.notified() => {}
                            _ = tokio::time::sleep(QUEUE_POLL_INTERVAL) => {}
                            _ = inner.shutdown.cancelled() => break,
                        }
                    }
                }
            }
            tracing::debug!(kind = %J::KIND, "queue processor stopped");
        })
    }

    async fn run_task(self: &Arc<Self>, id: TaskId) {
        // Cancelled or discarded while queued
        let Some((input, cancel)) = self.begin(id) else {
            return;
        };

        let reporter = {
            let inner = Arc::clone(self);
            Arc::new(move |message: String, percent: Option<u8>| {
                inner.report(id, message, percent);
            })
        };
        let ctx = JobContext::new(id, cancel, reporter);

        let outcome = AssertUnwindSafe(self.job.run(input, ctx))
            .catch_unwind()
            .await;

        match outcome {
            Ok(result) => self.finish(id, result),
            Err(_) => {
                tracing::error!(task_id = %id, kind = %J::KIND, "job panicked");
                self.fail_internal(id, "job panicked");
            }
        }
    }
}

