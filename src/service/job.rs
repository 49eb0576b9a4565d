//! The unit of work a task service runs

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, TaskFailure};
use crate::types::{TaskId, TaskKind};

/// Work performed by a [`TaskService`](super::TaskService) for every submitted task
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// What a task is submitted with
    type Input: Clone + Send + Sync + 'static;
    /// What a COMPLETED task carries
    type Output: Clone + Send + Sync + 'static;

    /// Which service this job belongs to
    const KIND: TaskKind;

    /// Short description of a submitted input, used in events and logs
    fn describe(input: &Self::Input) -> String;

    /// Short description of an output, used in the completed event
    fn summarize(output: &Self::Output) -> String;

    /// Lines copied into the task log when the task completes
    fn output_log(_output: &Self::Output) -> Vec<String> {
        Vec::new()
    }

    /// Run one task to completion
    ///
    /// Implementations should call [`JobContext::checkpoint`] between
    /// long-running steps so cancellation takes effect promptly.
    async fn run(&self, input: Self::Input, ctx: JobContext) -> Result<Self::Output, JobError>;
}

/// How a job ended without producing output
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// Stopped at a cancellation checkpoint
    #[error("cancelled")]
    Cancelled,
    /// Failed with a classified error
    #[error("{0}")]
    Failed(TaskFailure),
}

impl From<Error> for JobError {
    fn from(err: Error) -> Self {
        match err {
            Error::Cancelled => JobError::Cancelled,
            other => JobError::Failed(TaskFailure::from_error(&other)),
        }
    }
}

type Reporter = Arc<dyn Fn(String, Option<u8>) + Send + Sync>;

/// Handle given to a running job
#[derive(Clone)]
pub struct JobContext {
    task_id: TaskId,
    cancel: CancellationToken,
    reporter: Reporter,
}

impl JobContext {
    pub(crate) fn new(task_id: TaskId, cancel: CancellationToken, reporter: Reporter) -> Self {
        Self {
            task_id,
            cancel,
            reporter,
        }
    }

    /// Id of the task being run
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Token that fires when the task is cancelled
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Return early if cancellation has been requested
    pub fn checkpoint(&self) -> Result<(), JobError> {
        if self.cancel.is_cancelled() {
            Err(JobError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Emit a progress event and append the message to the task log
    pub fn progress(&self, message: impl Into<String>, percent: Option<u8>) {
        (self.reporter)(message.into(), percent);
    }
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("task_id", &self.task_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
