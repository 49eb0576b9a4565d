//! Core task types for standards-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TaskFailure;

/// Unique identifier for a task
///
/// Ids are allocated from a process-wide counter, so they are unique across
/// every service instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Allocate a fresh, never-before-used id
    pub fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<TaskId> for u64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Task lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Queued and waiting for a worker
    Pending,
    /// Held by a worker
    Running,
    /// Finished successfully (possibly with an empty result)
    Completed,
    /// Finished with an error
    Failed,
    /// Stopped by request
    Cancelled,
}

impl TaskStatus {
    /// Terminal states never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    /// Lowercase name of this status
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a task does
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Multi-source lookup
    Search,
    /// Artifact retrieval
    Download,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Search => f.write_str("search"),
            TaskKind::Download => f.write_str("download"),
        }
    }
}

/// Task priority within a service queue
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority (-1)
    Low = -1,
    /// Normal priority (0)
    #[default]
    Normal = 0,
    /// High priority (1)
    High = 1,
    /// Jump ahead of everything else (2)
    Force = 2,
}

/// Kind of lifecycle event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Task accepted (status PENDING)
    Submitted,
    /// Task made progress (first one marks RUNNING)
    Progress,
    /// Task COMPLETED
    Completed,
    /// Task FAILED
    Failed,
    /// Task CANCELLED
    Cancelled,
}

impl EventType {
    /// Whether this event ends the task's event sequence
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventType::Completed | EventType::Failed | EventType::Cancelled
        )
    }
}

/// A lifecycle event emitted by a task service
///
/// Per task, events are emitted in order: one `submitted`, any number of
/// `progress`, then exactly one terminal event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskEvent<O> {
    /// Task the event belongs to
    pub task_id: TaskId,
    /// Which service emitted it
    pub kind: TaskKind,
    /// Event type
    pub event: EventType,
    /// Task status at the moment of emission
    pub status: TaskStatus,
    /// Human-readable message
    pub message: String,
    /// Progress percentage (0-100), when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Failure detail (failed events only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskFailure>,
    /// Task output (completed events only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<O>,
    /// Emission time
    pub timestamp: DateTime<Utc>,
}

impl<O> TaskEvent<O> {
    /// Create an event with no progress, error or result attached
    pub fn new(
        task_id: TaskId,
        kind: TaskKind,
        event: EventType,
        status: TaskStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            kind,
            event,
            status,
            message: message.into(),
            progress: None,
            error: None,
            result: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach a progress percentage
    pub fn with_progress(mut self, progress: Option<u8>) -> Self {
        self.progress = progress;
        self
    }

    /// Attach failure detail
    pub fn with_error(mut self, error: TaskFailure) -> Self {
        self.error = Some(error);
        self
    }

    /// Attach the task output
    pub fn with_result(mut self, result: O) -> Self {
        self.result = Some(result);
        self
    }
}

/// A timestamped line in a task's log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the line was written
    pub at: DateTime<Utc>,
    /// The line itself
    pub message: String,
}

/// A unit of asynchronous work tracked by a task service
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task<I, O> {
    /// Unique id
    pub id: TaskId,
    /// Which service owns it
    pub kind: TaskKind,
    /// Current status
    pub status: TaskStatus,
    /// Queue priority
    pub priority: Priority,
    /// Input the task was submitted with
    pub input: I,
    /// Output, present once COMPLETED
    pub result: Option<O>,
    /// Failure detail, present once FAILED
    pub error: Option<TaskFailure>,
    /// Last reported progress percentage
    pub progress: u8,
    /// Source-by-source log
    pub log: Vec<LogEntry>,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// When a worker picked it up
    pub started_at: Option<DateTime<Utc>>,
    /// When it reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
}

impl<I, O> Task<I, O> {
    /// Create a PENDING task
    pub fn new(kind: TaskKind, input: I, priority: Priority) -> Self {
        Self {
            id: TaskId::next(),
            kind,
            status: TaskStatus::Pending,
            priority,
            input,
            result: None,
            error: None,
            progress: 0,
            log: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Move to `next`, stamping times as needed
    ///
    /// Returns false (and changes nothing) if the lifecycle forbids the move.
    pub fn transition(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        let now = Utc::now();
        if next == TaskStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
            if next == TaskStatus::Completed {
                self.progress = 100;
            }
        }
        self.status = next;
        true
    }

    /// Append a log line
    pub fn log(&mut self, message: impl Into<String>) {
        self.log.push(LogEntry {
            at: Utc::now(),
            message: message.into(),
        });
    }

    /// Whether the task has reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}
