//! Error types for standards-dl
//!
//! This module provides the error taxonomy for the library:
//! - [`Error`] for operations that fail outright (registry misuse, unknown tasks, config)
//! - [`SourceError`] for a single source failing during search (isolated, never fatal)
//! - [`DownloadFailure`] for classified retrieval failures
//! - [`NoResultError`] describing an orchestration that found nothing (not a failure)
//! - [`TaskFailure`] attached to FAILED tasks and their terminal event

use crate::types::{TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for standards-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for standards-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "search.source_timeout")
        key: Option<String>,
    },

    /// A source with the same id is already registered
    #[error("source already registered: {0}")]
    DuplicateSource(String),

    /// No source with this id is registered
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// No task with this id is known to the service
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    /// The operation cannot proceed because no capable source is enabled
    #[error("no sources enabled for this operation")]
    NoSourcesEnabled,

    /// The task was cancelled at a checkpoint
    #[error("task cancelled")]
    Cancelled,

    /// A bounded wait elapsed
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// A single source failed
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Artifact retrieval failed
    #[error("download failed: {0}")]
    Download(#[from] DownloadFailure),

    /// Operation not allowed in the task's current state
    #[error("cannot {operation} task {id} in state {current_state}")]
    InvalidState {
        /// The task that is in the wrong state
        id: TaskId,
        /// The operation that was attempted (e.g., "discard")
        operation: String,
        /// The state that prevents the operation
        current_state: TaskStatus,
    },

    /// File collision at a destination path
    #[error("file collision at {path}: {reason}")]
    FileCollision {
        /// The path where the collision occurred
        path: PathBuf,
        /// The reason for the collision
        reason: String,
    },

    /// A path could not be used
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The offending path
        path: PathBuf,
        /// Why it could not be used
        reason: String,
    },

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Machine-readable error code, stable across releases
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::DuplicateSource(_) => "duplicate_source",
            Error::UnknownSource(_) => "unknown_source",
            Error::UnknownTask(_) => "unknown_task",
            Error::NoSourcesEnabled => "no_sources_enabled",
            Error::Cancelled => "cancelled",
            Error::Timeout(_) => "timeout",
            Error::Source(_) => "source_error",
            Error::Download(_) => "download_failed",
            Error::InvalidState { .. } => "invalid_state",
            Error::FileCollision { .. } => "file_collision",
            Error::InvalidPath { .. } => "invalid_path",
            Error::ShuttingDown => "shutting_down",
            Error::Io(_) => "io_error",
            Error::Other(_) => "internal_error",
        }
    }

    /// Shorthand for a configuration error tied to a key
    pub(crate) fn config(message: impl Into<String>, key: &str) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Failure of a single source during search
///
/// These never fail an orchestration; the source simply contributes nothing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The source could not be reached
    #[error("connection failed: {0}")]
    Connection(String),

    /// The call did not finish within its budget
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The source answered but its response could not be understood
    #[error("unparseable response: {0}")]
    Parse(String),

    /// The source refused the request (rate limiting, bot detection, auth)
    #[error("rejected: {0}")]
    Rejected(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

/// Classification of a retrieval failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connectivity problem or timeout
    Network,
    /// The identifier is unknown to the source
    NotFound,
    /// The source cannot produce this artifact type
    Unsupported,
    /// Artifact retrieved but failed an integrity/consistency check
    Corrupted,
    /// Unclassified
    Unknown,
}

impl FailureKind {
    /// Best-effort classification of a free-text error message
    ///
    /// Used when a source reports a failure without classifying it.
    pub fn classify(message: &str) -> Self {
        let msg = message.to_lowercase();
        if msg.contains("timeout")
            || msg.contains("timed out")
            || msg.contains("connect")
            || msg.contains("network")
            || msg.contains("dns")
            || msg.contains("503")
            || msg.contains("502")
        {
            FailureKind::Network
        } else if msg.contains("not found") || msg.contains("404") || msg.contains("no such") {
            FailureKind::NotFound
        } else if msg.contains("unsupported") || msg.contains("not supported") {
            FailureKind::Unsupported
        } else if msg.contains("corrupt") || msg.contains("integrity") || msg.contains("checksum")
        {
            FailureKind::Corrupted
        } else {
            FailureKind::Unknown
        }
    }

    /// Aggregate the kinds of every exhausted attempt into one classification
    ///
    /// If every attempt failed the same way that kind wins. Mixed failures that
    /// include a network failure are reported as network (a retry may help);
    /// anything else mixed is unknown.
    pub fn aggregate(kinds: &[FailureKind]) -> Self {
        let Some(first) = kinds.first() else {
            return FailureKind::Unknown;
        };
        if kinds.iter().all(|k| k == first) {
            *first
        } else if kinds.contains(&FailureKind::Network) {
            FailureKind::Network
        } else {
            FailureKind::Unknown
        }
    }

    /// Snake-case name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Network => "network",
            FailureKind::NotFound => "not_found",
            FailureKind::Unsupported => "unsupported",
            FailureKind::Corrupted => "corrupted",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified retrieval failure, with the source-by-source log that led to it
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct DownloadFailure {
    /// Failure classification
    pub kind: FailureKind,
    /// Human-readable summary
    pub message: String,
    /// Source-by-source log lines
    #[serde(default)]
    pub log: Vec<String>,
}

impl DownloadFailure {
    /// Create a failure with an empty log
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            log: Vec::new(),
        }
    }

    /// Connectivity or timeout failure
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Network, message)
    }

    /// Artifact failed its integrity check
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Corrupted, message)
    }

    /// Attach a log, replacing any existing one
    pub fn with_log(mut self, log: Vec<String>) -> Self {
        self.log = log;
        self
    }
}

/// An orchestration that completed without any result
///
/// Not a failure: the task still COMPLETES, with an empty record set.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("no result, sources tried: {}", .tried.join(", "))]
pub struct NoResultError {
    /// Source ids that were attempted, in order
    pub tried: Vec<String>,
}

/// Error detail attached to a FAILED task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Machine-readable error code (see [`Error::error_code`])
    pub code: String,
    /// Retrieval failure classification, when the failure came from a download
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    /// Human-readable message
    pub message: String,
    /// Source-by-source log
    #[serde(default)]
    pub log: Vec<String>,
}

impl TaskFailure {
    /// Build a failure from an error, lifting any download classification and log
    pub fn from_error(error: &Error) -> Self {
        let (kind, log) = match error {
            Error::Download(failure) => (Some(failure.kind), failure.log.clone()),
            _ => (None, Vec::new()),
        };
        Self {
            code: error.error_code().to_string(),
            kind,
            message: error.to_string(),
            log,
        }
    }

    /// Failure raised by the service itself rather than by the job
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self {
            code: "internal_error".to_string(),
            kind: None,
            message: message.into(),
            log: Vec::new(),
        }
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "[{}/{}] {}", self.code, kind, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}
