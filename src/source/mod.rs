//! Source adapters
//!
//! A source is anything that can look up identifiers and, optionally, fetch
//! the artifact behind a record. Concrete adapters live outside this crate;
//! they implement [`SourceCapability`] and are registered in a
//! [`SourceRegistry`] together with a [`SourceDescriptor`].

mod registry;

pub use registry::{HealthReport, RegisteredSource, SourceDescriptor, SourceRegistry};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{FailureKind, SourceError};

/// Well-known metadata field names
///
/// Sources may report any field; these are the ones consumers commonly rely on.
pub mod fields {
    /// Publication date
    pub const PUBLISH_DATE: &str = "publish_date";
    /// Date the document takes effect
    pub const IMPLEMENT_DATE: &str = "implement_date";
    /// Lifecycle status (current, withdrawn, ...)
    pub const STATUS: &str = "status";
    /// Identifier of the superseding document
    pub const REPLACED_BY: &str = "replaced_by";
}

/// One record as reported by one source
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Id of the source that produced the record
    pub source_id: String,
    /// Identifier exactly as the source wrote it
    pub identifier: String,
    /// Human-readable title
    pub name: String,
    /// Optional metadata; `None` means the source reported the field as missing
    #[serde(default)]
    pub fields: BTreeMap<String, Option<String>>,
    /// Whether this source claims to be able to deliver the artifact
    #[serde(default)]
    pub has_artifact: bool,
}

impl RawRecord {
    /// Create a record with no metadata
    pub fn new(
        source_id: impl Into<String>,
        identifier: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            identifier: identifier.into(),
            name: name.into(),
            fields: BTreeMap::new(),
            has_artifact: false,
        }
    }

    /// Set a metadata field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), Some(value.into()));
        self
    }

    /// Report a metadata field as explicitly missing
    pub fn with_null(mut self, key: impl Into<String>) -> Self {
        self.fields.insert(key.into(), None);
        self
    }

    /// Mark the artifact as available from this source
    pub fn with_artifact(mut self) -> Self {
        self.has_artifact = true;
        self
    }

    /// A field's value, treating null and blank strings as absent
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(|v| v.as_deref())
            .filter(|v| !v.trim().is_empty())
    }
}

/// Result of a single source download call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOutcome {
    /// Whether the source believes it succeeded
    pub success: bool,
    /// Where the artifact was written (success only)
    pub artifact_path: Option<PathBuf>,
    /// Error message (failure only)
    pub error: Option<String>,
    /// Classification, when the source knows it
    pub kind: Option<FailureKind>,
    /// Log lines produced during the attempt
    #[serde(default)]
    pub log: Vec<String>,
}

impl DownloadOutcome {
    /// Successful retrieval
    pub fn ok(path: impl Into<PathBuf>) -> Self {
        Self {
            success: true,
            artifact_path: Some(path.into()),
            error: None,
            kind: None,
            log: Vec::new(),
        }
    }

    /// Failed retrieval; the kind is guessed from the message
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            artifact_path: None,
            error: Some(error.into()),
            kind: None,
            log: Vec::new(),
        }
    }

    /// Failed retrieval with a known classification
    pub fn fail_with(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            ..Self::fail(error)
        }
    }

    /// Attach log lines
    pub fn with_log(mut self, log: Vec<String>) -> Self {
        self.log = log;
        self
    }
}

/// Outcome of a health probe
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Whether the source is usable
    pub available: bool,
    /// Optional detail
    pub message: Option<String>,
}

impl HealthStatus {
    /// Source is usable
    pub fn up() -> Self {
        Self {
            available: true,
            message: None,
        }
    }

    /// Source is unusable, with a reason
    pub fn down(message: impl Into<String>) -> Self {
        Self {
            available: false,
            message: Some(message.into()),
        }
    }
}

/// A pluggable lookup/retrieval backend
///
/// Implementations must be `Send + Sync`: the orchestrators call them
/// concurrently from worker tasks. Timeouts are enforced by the caller, so an
/// implementation may simply block on its network I/O.
#[async_trait]
pub trait SourceCapability: Send + Sync {
    /// Look up records matching `keyword`
    ///
    /// An empty vector means "nothing found" and is not an error.
    async fn search(&self, keyword: &str) -> Result<Vec<RawRecord>, SourceError>;

    /// Retrieve the artifact for `record` into `destination`
    ///
    /// The destination directory is created by the caller. Failures are
    /// reported through the outcome rather than as an error so the source can
    /// attach its log.
    async fn download(&self, record: &RawRecord, destination: &Path) -> DownloadOutcome;

    /// Probe whether the source is currently usable
    ///
    /// `None` means the source does not support probing.
    async fn health_check(&self) -> Option<HealthStatus> {
        None
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_treats_null_and_blank_as_absent() {
        let record = RawRecord::new("a", "GB/T 1", "x")
            .with_null(fields::STATUS)
            .with_field(fields::PUBLISH_DATE, "  ")
            .with_field(fields::REPLACED_BY, "GB/T 2");
        assert_eq!(record.field(fields::STATUS), None);
        assert_eq!(record.field(fields::PUBLISH_DATE), None);
        assert_eq!(record.field(fields::REPLACED_BY), Some("GB/T 2"));
        assert_eq!(record.field("missing"), None);
    }

    #[test]
    fn outcome_constructors() {
        let ok = DownloadOutcome::ok("/tmp/a.pdf");
        assert!(ok.success);
        assert_eq!(ok.artifact_path.as_deref(), Some(Path::new("/tmp/a.pdf")));

        let failed = DownloadOutcome::fail_with(FailureKind::NotFound, "404");
        assert!(!failed.success);
        assert_eq!(failed.kind, Some(FailureKind::NotFound));
        assert_eq!(failed.error.as_deref(), Some("404"));
        assert!(DownloadOutcome::fail("boom").kind.is_none());
    }

    #[test]
    fn raw_record_roundtrips_through_json_with_nulls() {
        let record = RawRecord::new("a", "GB 1", "n").with_null(fields::STATUS);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["fields"]["status"].is_null());
        let back: RawRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
