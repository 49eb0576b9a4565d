//! Task services
//!
//! A [`TaskService`] owns a table of tasks, a priority queue of pending
//! ones, a bounded worker pool and an event bus. The search and download
//! services are the same machinery running a different [`Job`].

mod download;
mod events;
mod job;
mod lifecycle;
mod queue_processor;
mod search;

pub use download::{DownloadJob, DownloadTaskService};
pub use events::{EventHandler, SubscriptionId};
pub use job::{Job, JobContext, JobError};
pub use search::{SearchJob, SearchTaskService};

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore, broadcast};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result, TaskFailure};
use crate::types::{EventType, Priority, Task, TaskEvent, TaskId, TaskStatus};
use events::EventBus;

/// How long the queue processor sleeps when idle before re-checking
pub(crate) const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on how long shutdown waits for running tasks
pub(crate) const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Internal queue entry (higher priority first, then submission order)
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct QueuedTask {
    pub(crate) id: TaskId,
    pub(crate) priority: Priority,
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Ids are allocated monotonically, so a smaller id was submitted earlier
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

struct TaskSlot<J: Job> {
    task: Task<J::Input, J::Output>,
    cancel: CancellationToken,
}

pub(crate) struct Inner<J: Job> {
    job: J,
    tasks: RwLock<HashMap<TaskId, TaskSlot<J>>>,
    queue: Mutex<BinaryHeap<QueuedTask>>,
    queue_notify: Notify,
    concurrent_limit: Arc<Semaphore>,
    workers: usize,
    events: Arc<EventBus<J::Output>>,
    accepting_new: AtomicBool,
    running: AtomicBool,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

/// Queued, cancellable, observable execution of a [`Job`]
///
/// Cloning is cheap and every clone drives the same service.
pub struct TaskService<J: Job> {
    inner: Arc<Inner<J>>,
}

impl<J: Job> Clone for TaskService<J> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<J: Job> std::fmt::Debug for TaskService<J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskService")
            .field("kind", &J::KIND)
            .field("workers", &self.inner.workers)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl<J: Job> TaskService<J> {
    /// Create a service running `job` on at most `workers` tasks at a time
    ///
    /// Nothing runs until [`start`](Self::start) is called; tasks submitted
    /// before that wait in the queue.
    pub fn new(job: J, workers: usize, event_buffer: usize) -> Self {
        let workers = workers.max(1);
        Self {
            inner: Arc::new(Inner {
                job,
                tasks: RwLock::new(HashMap::new()),
                queue: Mutex::new(BinaryHeap::new()),
                queue_notify: Notify::new(),
                concurrent_limit: Arc::new(Semaphore::new(workers)),
                workers,
                events: Arc::new(EventBus::new(event_buffer)),
                accepting_new: AtomicBool::new(true),
                running: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                handles: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The job this service runs
    pub fn job(&self) -> &J {
        &self.inner.job
    }

    /// Size of the worker pool
    pub fn workers(&self) -> usize {
        self.inner.workers
    }

    /// Submit a task at normal priority
    pub fn submit(&self, input: J::Input) -> Result<Task<J::Input, J::Output>> {
        self.submit_with_priority(input, Priority::Normal)
    }

    /// Submit a task; returns the PENDING task without waiting for any work
    pub fn submit_with_priority(
        &self,
        input: J::Input,
        priority: Priority,
    ) -> Result<Task<J::Input, J::Output>> {
        if !self.inner.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let mut task = Task::new(J::KIND, input, priority);
        let description = J::describe(&task.input);
        task.log(format!("submitted: {description}"));
        let id = task.id;
        let snapshot = task.clone();

        {
            let mut tasks = self.inner.write_tasks();
            tasks.insert(
                id,
                TaskSlot {
                    task,
                    cancel: CancellationToken::new(),
                },
            );
            self.inner.events.emit(TaskEvent::new(
                id,
                J::KIND,
                EventType::Submitted,
                TaskStatus::Pending,
                description.clone(),
            ));
        }

        lock(&self.inner.queue).push(QueuedTask { id, priority });
        self.inner.queue_notify.notify_one();

        tracing::info!(task_id = %id, kind = %J::KIND, ?priority, "{description}: submitted");
        Ok(snapshot)
    }

    /// Current state of a task
    pub fn status(&self, id: TaskId) -> Result<Task<J::Input, J::Output>> {
        self.inner
            .read_tasks()
            .get(&id)
            .map(|slot| slot.task.clone())
            .ok_or(Error::UnknownTask(id))
    }

    /// Request cancellation
    ///
    /// A PENDING task is CANCELLED at once. A RUNNING task stops at its next
    /// checkpoint and then ends CANCELLED. Returns false for unknown or
    /// already-terminal tasks, which are left untouched.
    pub fn cancel(&self, id: TaskId) -> bool {
        self.inner.cancel(id, "cancelled by request")
    }

    /// Every task the service knows about, oldest first
    pub fn tasks(&self) -> Vec<Task<J::Input, J::Output>> {
        let mut all: Vec<_> = self
            .inner
            .read_tasks()
            .values()
            .map(|slot| slot.task.clone())
            .collect();
        all.sort_by_key(|t| t.id);
        all
    }

    /// Tasks currently in `status`, oldest first
    pub fn tasks_with_status(&self, status: TaskStatus) -> Vec<Task<J::Input, J::Output>> {
        let mut matching: Vec<_> = self
            .inner
            .read_tasks()
            .values()
            .filter(|slot| slot.task.status == status)
            .map(|slot| slot.task.clone())
            .collect();
        matching.sort_by_key(|t| t.id);
        matching
    }

    /// Number of tasks waiting for a worker
    pub fn queue_len(&self) -> usize {
        lock(&self.inner.queue).len()
    }

    /// Remove a finished task from the table
    pub fn discard(&self, id: TaskId) -> Result<Task<J::Input, J::Output>> {
        let mut tasks = self.inner.write_tasks();
        let status = tasks
            .get(&id)
            .map(|slot| slot.task.status)
            .ok_or(Error::UnknownTask(id))?;
        if !status.is_terminal() {
            return Err(Error::InvalidState {
                id,
                operation: "discard".into(),
                current_state: status,
            });
        }
        tasks
            .remove(&id)
            .map(|slot| slot.task)
            .ok_or(Error::UnknownTask(id))
    }

    /// Call `handler` for every event of type `event_type`
    ///
    /// Handlers run on the service's dispatcher task, never on a worker.
    pub fn subscribe<F>(&self, event_type: EventType, handler: F) -> SubscriptionId
    where
        F: Fn(&TaskEvent<J::Output>) + Send + Sync + 'static,
    {
        self.inner
            .events
            .add_handler(Some(event_type), Arc::new(handler))
    }

    /// Call `handler` for every event
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&TaskEvent<J::Output>) + Send + Sync + 'static,
    {
        self.inner.events.add_handler(None, Arc::new(handler))
    }

    /// Remove a handler; false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.remove_handler(id)
    }

    /// Raw receiver of every event emitted from now on
    pub fn events(&self) -> broadcast::Receiver<TaskEvent<J::Output>> {
        self.inner.events.subscribe()
    }

    /// Events as a stream, for use with `StreamExt`
    pub fn event_stream(&self) -> BroadcastStream<TaskEvent<J::Output>> {
        BroadcastStream::new(self.inner.events.subscribe())
    }

    /// Wait until a task reaches a terminal state and return it
    pub async fn wait(&self, id: TaskId) -> Result<Task<J::Input, J::Output>> {
        // Subscribe before the first check so the terminal event cannot slip by
        let mut rx = self.inner.events.subscribe();
        loop {
            let task = self.status(id)?;
            if task.is_finished() {
                return Ok(task);
            }
            match rx.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return self.status(id),
            }
        }
    }
}

impl<J: Job> Inner<J> {
    fn read_tasks(&self) -> RwLockReadGuard<'_, HashMap<TaskId, TaskSlot<J>>> {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tasks(&self) -> RwLockWriteGuard<'_, HashMap<TaskId, TaskSlot<J>>> {
        self.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn running_count(&self) -> usize {
        self.read_tasks()
            .values()
            .filter(|slot| slot.task.status == TaskStatus::Running)
            .count()
    }

    // Events are emitted while the table lock is held so each task's
    // events leave in the same order its state changed.

    fn cancel(&self, id: TaskId, reason: &str) -> bool {
        let mut tasks = self.write_tasks();
        let Some(slot) = tasks.get_mut(&id) else {
            return false;
        };

        match slot.task.status {
            TaskStatus::Pending => {
                slot.cancel.cancel();
                slot.task.transition(TaskStatus::Cancelled);
                slot.task.log(reason);
                self.events.emit(TaskEvent::new(
                    id,
                    J::KIND,
                    EventType::Cancelled,
                    TaskStatus::Cancelled,
                    reason,
                ));
                drop(tasks);
                lock(&self.queue).retain(|queued| queued.id != id);
                tracing::info!(task_id = %id, kind = %J::KIND, "pending task cancelled");
                true
            }
            TaskStatus::Running => {
                if !slot.cancel.is_cancelled() {
                    slot.cancel.cancel();
                    slot.task.log(format!("cancellation requested: {reason}"));
                    tracing::info!(task_id = %id, kind = %J::KIND, "cancellation requested");
                }
                true
            }
            _ => false,
        }
    }

    /// PENDING -> RUNNING. `None` if the task was cancelled or discarded meanwhile.
    fn begin(&self, id: TaskId) -> Option<(J::Input, CancellationToken)> {
        let mut tasks = self.write_tasks();
        let slot = tasks.get_mut(&id)?;
        if !slot.task.transition(TaskStatus::Running) {
            return None;
        }
        let description = J::describe(&slot.task.input);
        slot.task.log("started");
        self.events.emit(
            TaskEvent::new(
                id,
                J::KIND,
                EventType::Progress,
                TaskStatus::Running,
                format!("started: {description}"),
            )
            .with_progress(Some(0)),
        );
        tracing::debug!(task_id = %id, kind = %J::KIND, "{description}: started");
        Some((slot.task.input.clone(), slot.cancel.clone()))
    }

    fn report(&self, id: TaskId, message: String, percent: Option<u8>) {
        let mut tasks = self.write_tasks();
        let Some(slot) = tasks.get_mut(&id) else {
            return;
        };
        if slot.task.status != TaskStatus::Running || slot.cancel.is_cancelled() {
            return;
        }
        let percent = percent.map(|p| p.min(100));
        if let Some(p) = percent {
            slot.task.progress = p;
        }
        slot.task.log(message.clone());
        self.events.emit(
            TaskEvent::new(id, J::KIND, EventType::Progress, TaskStatus::Running, message)
                .with_progress(percent),
        );
    }

    /// RUNNING -> terminal
    fn finish(&self, id: TaskId, outcome: std::result::Result<J::Output, JobError>) {
        let mut tasks = self.write_tasks();
        let Some(slot) = tasks.get_mut(&id) else {
            return;
        };
        if slot.task.is_finished() {
            return;
        }

        // A requested cancel wins over whatever the job produced
        let outcome = if slot.cancel.is_cancelled() {
            Err(JobError::Cancelled)
        } else {
            outcome
        };

        match outcome {
            Ok(output) => {
                let summary = J::summarize(&output);
                slot.task.transition(TaskStatus::Completed);
                for line in J::output_log(&output) {
                    slot.task.log(line);
                }
                slot.task.result = Some(output.clone());
                slot.task.log(format!("completed: {summary}"));
                self.events.emit(
                    TaskEvent::new(id, J::KIND, EventType::Completed, TaskStatus::Completed, summary.clone())
                        .with_progress(Some(100))
                        .with_result(output),
                );
                tracing::info!(task_id = %id, kind = %J::KIND, "completed: {summary}");
            }
            Err(JobError::Cancelled) => {
                slot.task.transition(TaskStatus::Cancelled);
                slot.task.log("cancelled");
                self.events.emit(TaskEvent::new(
                    id,
                    J::KIND,
                    EventType::Cancelled,
                    TaskStatus::Cancelled,
                    "cancelled",
                ));
                tracing::info!(task_id = %id, kind = %J::KIND, "cancelled while running");
            }
            Err(JobError::Failed(failure)) => {
                slot.task.transition(TaskStatus::Failed);
                for line in &failure.log {
                    slot.task.log(line.clone());
                }
                slot.task.log(format!("failed: {}", failure.message));
                slot.task.error = Some(failure.clone());
                self.events.emit(
                    TaskEvent::new(
                        id,
                        J::KIND,
                        EventType::Failed,
                        TaskStatus::Failed,
                        failure.message.clone(),
                    )
                    .with_error(failure.clone()),
                );
                tracing::warn!(
                    task_id = %id,
                    kind = %J::KIND,
                    code = %failure.code,
                    "failed: {}",
                    failure.message
                );
            }
        }
    }

    fn fail_internal(&self, id: TaskId, message: &str) {
        self.finish(id, Err(JobError::Failed(TaskFailure::internal(message))));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::timeout;

    use crate::types::TaskKind;

    /// Sleeps, then echoes its input; fails on "fail", panics on "panic"
    struct EchoJob {
        delay: Duration,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl EchoJob {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                active: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Job for EchoJob {
        type Input = String;
        type Output = String;
        const KIND: TaskKind = TaskKind::Search;

        fn describe(input: &String) -> String {
            format!("echo {input}")
        }

        fn summarize(output: &String) -> String {
            output.clone()
        }

        async fn run(&self, input: String, ctx: JobContext) -> std::result::Result<String, JobError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            ctx.progress("working", Some(50));
            let outcome = tokio::select! {
                _ = tokio::time::sleep(self.delay) => Ok(()),
                _ = ctx.cancellation_token().cancelled() => Err(JobError::Cancelled),
            };
            self.active.fetch_sub(1, Ordering::SeqCst);
            outcome?;
            ctx.checkpoint()?;

            match input.as_str() {
                "fail" => Err(JobError::from(Error::Other("boom".into()))),
                "panic" => panic!("job bug"),
                _ => Ok(input.to_uppercase()),
            }
        }
    }

    fn service(delay: Duration, workers: usize) -> TaskService<EchoJob> {
        TaskService::new(EchoJob::new(delay), workers, 64)
    }

    async fn collect_events(
        rx: &mut broadcast::Receiver<TaskEvent<String>>,
        id: TaskId,
    ) -> Vec<EventType> {
        let mut seen = Vec::new();
        loop {
            let event = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
            if event.task_id != id {
                continue;
            }
            seen.push(event.event);
            if event.event.is_terminal() {
                return seen;
            }
        }
    }

    #[test]
    fn queue_orders_by_priority_then_submission() {
        let mut heap = BinaryHeap::new();
        heap.push(QueuedTask { id: TaskId(1), priority: Priority::Normal });
        heap.push(QueuedTask { id: TaskId(2), priority: Priority::High });
        heap.push(QueuedTask { id: TaskId(3), priority: Priority::Normal });
        heap.push(QueuedTask { id: TaskId(4), priority: Priority::Low });

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop()).map(|q| q.id.0).collect();
        assert_eq!(order, vec![2, 1, 3, 4]);
    }

    #[tokio::test]
    async fn submit_returns_pending_without_starting() {
        let svc = service(Duration::from_millis(10), 2);
        let task = svc.submit("a".into()).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(svc.status(task.id).unwrap().status, TaskStatus::Pending);
        assert_eq!(svc.queue_len(), 1);
    }

    #[tokio::test]
    async fn completed_task_carries_result_and_ordered_events() {
        let svc = service(Duration::from_millis(10), 2);
        let mut rx = svc.events();
        svc.start().unwrap();

        let task = svc.submit("abc".into()).unwrap();
        let events = collect_events(&mut rx, task.id).await;
        assert_eq!(events.first(), Some(&EventType::Submitted));
        assert_eq!(events.last(), Some(&EventType::Completed));
        assert!(events[1..events.len() - 1].iter().all(|e| *e == EventType::Progress));

        let done = svc.wait(task.id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.result.as_deref(), Some("ABC"));
        assert_eq!(done.progress, 100);
        assert!(done.finished_at.is_some());
        assert!(done.log.iter().any(|l| l.message == "working"));

        svc.shutdown().await;
    }

    #[tokio::test]
    async fn failing_and_panicking_jobs_end_failed() {
        let svc = service(Duration::from_millis(1), 2);
        svc.start().unwrap();

        let failed = svc.submit("fail".into()).unwrap();
        let panicked = svc.submit("panic".into()).unwrap();

        let failed = timeout(Duration::from_secs(5), svc.wait(failed.id)).await.unwrap().unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error.as_ref().unwrap().code, "internal_error");
        assert!(failed.result.is_none());

        let panicked = timeout(Duration::from_secs(5), svc.wait(panicked.id)).await.unwrap().unwrap();
        assert_eq!(panicked.status, TaskStatus::Failed);
        assert!(panicked.error.unwrap().message.contains("panicked"));

        svc.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_task_is_an_error() {
        let svc = service(Duration::ZERO, 1);
        assert!(matches!(svc.status(TaskId(u64::MAX)), Err(Error::UnknownTask(_))));
        assert!(!svc.cancel(TaskId(u64::MAX)));
    }

    #[tokio::test]
    async fn cancel_pending_task_is_immediate() {
        let svc = service(Duration::from_millis(10), 1);
        let mut rx = svc.events();
        let task = svc.submit("a".into()).unwrap();

        assert!(svc.cancel(task.id));
        assert_eq!(svc.status(task.id).unwrap().status, TaskStatus::Cancelled);
        assert_eq!(svc.queue_len(), 0);
        assert!(!svc.cancel(task.id));

        let events = collect_events(&mut rx, task.id).await;
        assert_eq!(events, vec![EventType::Submitted, EventType::Cancelled]);
    }

    #[tokio::test]
    async fn cancel_running_task_ends_cancelled_without_completion() {
        let svc = service(Duration::from_secs(30), 1);
        let mut rx = svc.events();
        svc.start().unwrap();

        let task = svc.submit("slow".into()).unwrap();
        loop {
            let event = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
            if event.task_id == task.id && event.event == EventType::Progress {
                break;
            }
        }
        assert!(svc.cancel(task.id));

        let done = timeout(Duration::from_secs(5), svc.wait(task.id)).await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Cancelled);
        assert!(done.result.is_none());

        let rest = collect_events(&mut rx, task.id).await;
        assert_eq!(rest.last(), Some(&EventType::Cancelled));
        assert!(!rest.contains(&EventType::Completed));
        assert!(!rest.contains(&EventType::Failed));
        assert!(!svc.cancel(task.id));

        svc.shutdown().await;
    }

    #[tokio::test]
    async fn worker_pool_bounds_concurrency() {
        let job = EchoJob::new(Duration::from_millis(50));
        let peak = job.peak.clone();
        let svc = TaskService::new(job, 2, 64);
        svc.start().unwrap();

        let ids: Vec<TaskId> = (0..6)
            .map(|i| svc.submit(format!("t{i}")).unwrap().id)
            .collect();
        for id in ids {
            let task = timeout(Duration::from_secs(5), svc.wait(id)).await.unwrap().unwrap();
            assert_eq!(task.status, TaskStatus::Completed);
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(peak.load(Ordering::SeqCst), 2);

        svc.shutdown().await;
    }

    #[tokio::test]
    async fn discard_only_removes_finished_tasks() {
        let svc = service(Duration::from_millis(1), 1);
        let task = svc.submit("a".into()).unwrap();
        assert!(matches!(
            svc.discard(task.id),
            Err(Error::InvalidState { current_state: TaskStatus::Pending, .. })
        ));

        svc.cancel(task.id);
        let removed = svc.discard(task.id).unwrap();
        assert_eq!(removed.status, TaskStatus::Cancelled);
        assert!(matches!(svc.status(task.id), Err(Error::UnknownTask(_))));
        assert!(svc.tasks().is_empty());
    }

    #[tokio::test]
    async fn subscribed_handlers_see_filtered_events() {
        let svc = service(Duration::from_millis(1), 1);
        let completed = Arc::new(AtomicUsize::new(0));
        let everything = Arc::new(AtomicUsize::new(0));

        let c = completed.clone();
        svc.subscribe(EventType::Completed, move |event| {
            assert_eq!(event.status, TaskStatus::Completed);
            assert!(event.result.is_some());
            c.fetch_add(1, Ordering::SeqCst);
        });
        let e = everything.clone();
        let all = svc.subscribe_all(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });
        svc.start().unwrap();

        let task = svc.submit("x".into()).unwrap();
        svc.wait(task.id).await.unwrap();
        svc.shutdown().await;

        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert!(everything.load(Ordering::SeqCst) >= 3);
        assert!(svc.unsubscribe(all));
        assert!(!svc.unsubscribe(all));
    }

    #[tokio::test]
    async fn tasks_with_status_filters() {
        let svc = service(Duration::ZERO, 1);
        let a = svc.submit("a".into()).unwrap();
        let b = svc.submit("b".into()).unwrap();
        svc.cancel(b.id);

        let pending = svc.tasks_with_status(TaskStatus::Pending);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);
        assert_eq!(svc.tasks_with_status(TaskStatus::Cancelled)[0].id, b.id);
        assert_eq!(svc.tasks().len(), 2);
    }
}
