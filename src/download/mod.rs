//! Artifact retrieval with priority fallback
//!
//! The contributing sources of a [`CanonicalRecord`] are tried in priority
//! order. Each attempt is bounded by the per-attempt timeout and retried on
//! transient (network) failures; the whole sequence is bounded by the task
//! timeout. The first verified artifact wins.

mod integrity;

pub use integrity::{ArtifactFingerprint, verify_artifact};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{DownloadConfig, FileCollisionAction, RetryConfig};
use crate::error::{DownloadFailure, Error, FailureKind, Result};
use crate::merge::CanonicalRecord;
use crate::retry::with_retry_until;
use crate::source::{RawRecord, RegisteredSource, SourceRegistry};
use crate::utils::{artifact_file_name, get_unique_path};

/// Input of a download task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// The record whose artifact to fetch
    pub record: CanonicalRecord,
    /// Directory the artifact is written to
    pub destination: PathBuf,
}

impl DownloadRequest {
    /// Fetch `record` into `destination`
    pub fn new(record: CanonicalRecord, destination: impl Into<PathBuf>) -> Self {
        Self {
            record,
            destination: destination.into(),
        }
    }
}

/// One source's share of a retrieval
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadAttempt {
    /// Source id
    pub source_id: String,
    /// Whether this source delivered the artifact
    pub success: bool,
    /// Failure classification (failures only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    /// Last error message (failures only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of calls made, including retries
    pub tries: u32,
    /// Time spent on this source
    pub elapsed: Duration,
}

/// A retrieved and verified artifact
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Final location
    pub path: PathBuf,
    /// Source that delivered it
    pub source_id: String,
    /// File size in bytes
    pub size_bytes: u64,
    /// Lowercase hex SHA-256
    pub sha256: String,
    /// Every source tried, in order
    pub attempts: Vec<DownloadAttempt>,
    /// Source-by-source log
    pub log: Vec<String>,
}

struct Delivered {
    path: PathBuf,
    fingerprint: ArtifactFingerprint,
    log: Vec<String>,
}

/// Retrieves artifacts for merged records
#[derive(Clone, Debug)]
pub struct DownloadOrchestrator {
    registry: Arc<SourceRegistry>,
    attempt_timeout: Duration,
    task_timeout: Duration,
    retry: RetryConfig,
    rename_artifacts: bool,
    file_collision: FileCollisionAction,
}

impl DownloadOrchestrator {
    /// Build an orchestrator from the download and retry settings
    pub fn new(registry: Arc<SourceRegistry>, config: &DownloadConfig, retry: &RetryConfig) -> Self {
        Self {
            registry,
            attempt_timeout: config.attempt_timeout,
            task_timeout: config.task_timeout,
            retry: retry.clone(),
            rename_artifacts: config.rename_artifacts,
            file_collision: config.file_collision,
        }
    }

    /// Retrieve an artifact
    pub async fn download(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<Artifact> {
        self.download_with_progress(request, cancel, &|_: &str, _: u8| {})
            .await
    }

    /// Retrieve an artifact, calling `on_attempt` before each source is tried
    ///
    /// Fails with [`Error::Download`] once every contributing source is
    /// exhausted or the task timeout elapses, and with [`Error::Cancelled`]
    /// when `cancel` fires.
    pub async fn download_with_progress(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
        on_attempt: &(dyn Fn(&str, u8) + Send + Sync),
    ) -> Result<Artifact> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let record = &request.record;
        let mut log = Vec::new();
        let candidates = self.candidates(record, &mut log);
        if candidates.is_empty() {
            log.push("no source available for download".to_string());
            return Err(DownloadFailure::new(
                FailureKind::Unsupported,
                format!("no contributing source of {} can download", record.identifier),
            )
            .with_log(log)
            .into());
        }

        if let Err(e) = tokio::fs::create_dir_all(&request.destination).await {
            log.push(format!(
                "cannot create destination {}: {e}",
                request.destination.display()
            ));
            return Err(DownloadFailure::new(
                FailureKind::Unknown,
                format!("destination {} is not usable: {e}", request.destination.display()),
            )
            .with_log(log)
            .into());
        }
        tracing::info!(
            identifier = %record.identifier,
            sources = candidates.len(),
            destination = %request.destination.display(),
            "starting download"
        );

        let mut attempts = Vec::new();
        let run = tokio::time::timeout(
            self.task_timeout,
            self.try_sources(
                &candidates,
                &request.destination,
                cancel,
                on_attempt,
                &mut attempts,
                &mut log,
            ),
        )
        .await;

        let (source_id, delivered) = match run {
            Ok(Ok(Some(hit))) => hit,
            Ok(Ok(None)) => {
                log.push("all sources failed".to_string());
                let kinds: Vec<FailureKind> = attempts.iter().filter_map(|a| a.kind).collect();
                let kind = FailureKind::aggregate(&kinds);
                let tried: Vec<&str> = attempts.iter().map(|a| a.source_id.as_str()).collect();
                tracing::warn!(identifier = %record.identifier, %kind, ?tried, "all sources failed");
                return Err(DownloadFailure::new(
                    kind,
                    format!("all sources failed for {} (tried: {})", record.identifier, tried.join(", ")),
                )
                .with_log(log)
                .into());
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                log.push(format!("overall timeout after {:?}", self.task_timeout));
                tracing::warn!(identifier = %record.identifier, timeout = ?self.task_timeout, "download timed out");
                return Err(DownloadFailure::network(format!(
                    "download of {} timed out after {:?}",
                    record.identifier, self.task_timeout
                ))
                .with_log(log)
                .into());
            }
        };

        let path = self
            .place(record, delivered.path, &mut log)
            .await?;
        tracing::info!(identifier = %record.identifier, source = %source_id, path = %path.display(), "download finished");

        Ok(Artifact {
            path,
            source_id,
            size_bytes: delivered.fingerprint.size_bytes,
            sha256: delivered.fingerprint.sha256,
            attempts,
            log,
        })
    }

    fn candidates<'a>(
        &'a self,
        record: &'a CanonicalRecord,
        log: &mut Vec<String>,
    ) -> Vec<(&'a RegisteredSource, &'a RawRecord)> {
        for id in record.sources.iter().filter(|id| !self.registry.contains(id)) {
            log.push(format!("{id}: not registered, skipped"));
        }
        self.registry
            .sources()
            .iter()
            .filter_map(|source| {
                let raw = record.record_from(source.id())?;
                if source.descriptor().can_download {
                    Some((source, raw))
                } else {
                    log.push(format!("{}: cannot download, skipped", source.id()));
                    None
                }
            })
            .collect()
    }

    async fn try_sources(
        &self,
        candidates: &[(&RegisteredSource, &RawRecord)],
        destination: &Path,
        cancel: &CancellationToken,
        on_attempt: &(dyn Fn(&str, u8) + Send + Sync),
        attempts: &mut Vec<DownloadAttempt>,
        log: &mut Vec<String>,
    ) -> Result<Option<(String, Delivered)>> {
        let total = candidates.len();
        for (idx, (source, raw)) in candidates.iter().copied().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let hint = if raw.has_artifact { "artifact listed" } else { "no artifact flag" };
            on_attempt(
                &format!("trying {} ({}/{})", source.name(), idx + 1, total),
                progress(idx, total),
            );
            log.push(format!("{}: start attempt ({hint})", source.id()));

            let started = Instant::now();
            let tries = AtomicU32::new(0);
            let tries_ref = &tries;
            let result = with_retry_until(&self.retry, cancel, move || {
                tries_ref.fetch_add(1, Ordering::Relaxed);
                self.attempt(source, raw, destination, cancel)
            })
            .await;
            let tries = tries.into_inner();

            match result {
                Ok(delivered) => {
                    log.extend(delivered.log.iter().map(|l| format!("{}: {l}", source.id())));
                    log.push(format!("{}: success -> {}", source.id(), delivered.path.display()));
                    attempts.push(DownloadAttempt {
                        source_id: source.id().to_string(),
                        success: true,
                        kind: None,
                        error: None,
                        tries,
                        elapsed: started.elapsed(),
                    });
                    return Ok(Some((source.id().to_string(), delivered)));
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(_) if cancel.is_cancelled() => return Err(Error::Cancelled),
                Err(err) => {
                    let (kind, message) = match &err {
                        Error::Download(failure) => {
                            log.extend(failure.log.iter().map(|l| format!("{}: {l}", source.id())));
                            (failure.kind, failure.message.clone())
                        }
                        other => (FailureKind::Unknown, other.to_string()),
                    };
                    tracing::warn!(source = %source.id(), %kind, error = %message, tries, "download attempt failed");
                    log.push(format!("{}: failed ({kind}) -> {message}, trying next source", source.id()));
                    attempts.push(DownloadAttempt {
                        source_id: source.id().to_string(),
                        success: false,
                        kind: Some(kind),
                        error: Some(message),
                        tries,
                        elapsed: started.elapsed(),
                    });
                }
            }
        }
        Ok(None)
    }

    async fn attempt(
        &self,
        source: &RegisteredSource,
        raw: &RawRecord,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<Delivered> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let call = tokio::time::timeout(
            self.attempt_timeout,
            source.capability().download(raw, destination),
        );
        let outcome = tokio::select! {
            r = call => r,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };
        let Ok(outcome) = outcome else {
            return Err(DownloadFailure::network(format!(
                "attempt timed out after {:?}",
                self.attempt_timeout
            ))
            .into());
        };

        if !outcome.success {
            let message = outcome
                .error
                .unwrap_or_else(|| "source reported failure without detail".to_string());
            let kind = outcome
                .kind
                .unwrap_or_else(|| FailureKind::classify(&message));
            return Err(DownloadFailure::new(kind, message)
                .with_log(outcome.log)
                .into());
        }
        let Some(path) = outcome.artifact_path else {
            return Err(DownloadFailure::corrupted("source reported success without an artifact path")
                .with_log(outcome.log)
                .into());
        };
        match verify_artifact(&path).await {
            Ok(fingerprint) => Ok(Delivered {
                path,
                fingerprint,
                log: outcome.log,
            }),
            Err(failure) => Err(failure.with_log(outcome.log).into()),
        }
    }

    // Renames the artifact when configured; a skipped collision keeps the original name.
    async fn place(
        &self,
        record: &CanonicalRecord,
        path: PathBuf,
        log: &mut Vec<String>,
    ) -> Result<PathBuf> {
        if !self.rename_artifacts {
            return Ok(path);
        }
        let Some(parent) = path.parent() else {
            return Ok(path);
        };
        let name = artifact_file_name(
            &record.display_label(),
            path.extension().and_then(|e| e.to_str()),
        );
        let target = parent.join(name);
        if target == path {
            return Ok(path);
        }
        match get_unique_path(&target, self.file_collision) {
            Ok(unique) => {
                tokio::fs::rename(&path, &unique).await?;
                log.push(format!("renamed to {}", unique.display()));
                Ok(unique)
            }
            Err(Error::FileCollision { reason, .. })
                if self.file_collision == FileCollisionAction::Skip =>
            {
                log.push(format!("kept original name: {reason}"));
                Ok(path)
            }
            Err(e) => Err(e),
        }
    }
}

fn progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    u8::try_from(done * 100 / total).unwrap_or(100)
}
