use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::SourceCapability;
use crate::error::{Error, Result};

/// Static description of a registered source
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Stable id token
    pub id: String,
    /// Display name
    pub name: String,
    /// Rank; lower values win conflicts and are tried first
    pub priority: i32,
    /// Whether the source answers lookups
    pub can_search: bool,
    /// Whether the source can deliver artifacts
    pub can_download: bool,
}

impl SourceDescriptor {
    /// A source that can both search and download
    pub fn new(id: impl Into<String>, name: impl Into<String>, priority: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            priority,
            can_search: true,
            can_download: true,
        }
    }

    /// Disable downloads
    pub fn search_only(mut self) -> Self {
        self.can_download = false;
        self
    }

    /// Disable lookups
    pub fn download_only(mut self) -> Self {
        self.can_search = false;
        self
    }
}

/// A descriptor bound to its capability
#[derive(Clone)]
pub struct RegisteredSource {
    descriptor: SourceDescriptor,
    capability: Arc<dyn SourceCapability>,
    seq: usize,
}

impl RegisteredSource {
    /// The source's static description
    pub fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    /// The source's id
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    /// The source's display name
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Shared handle to the capability
    pub fn capability(&self) -> &Arc<dyn SourceCapability> {
        &self.capability
    }
}

impl std::fmt::Debug for RegisteredSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredSource")
            .field("descriptor", &self.descriptor)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

/// Result of probing one source
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Source id
    pub source_id: String,
    /// `None` if the source does not support probing
    pub available: Option<bool>,
    /// Wall-clock time the probe took
    pub latency_ms: u64,
    /// Detail from the source, or the reason the probe failed
    pub message: Option<String>,
}

/// The set of known sources, kept in priority order
///
/// Built once at startup and shared read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct SourceRegistry {
    sources: Vec<RegisteredSource>,
    next_seq: usize,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source
    ///
    /// Fails with [`Error::DuplicateSource`] if the id is taken. Sources with
    /// equal priority keep their registration order.
    pub fn register(
        &mut self,
        descriptor: SourceDescriptor,
        capability: Arc<dyn SourceCapability>,
    ) -> Result<()> {
        if self.contains(&descriptor.id) {
            return Err(Error::DuplicateSource(descriptor.id));
        }
        tracing::debug!(
            source = %descriptor.id,
            priority = descriptor.priority,
            can_search = descriptor.can_search,
            can_download = descriptor.can_download,
            "registered source"
        );
        let seq = self.next_seq;
        self.next_seq += 1;
        self.sources.push(RegisteredSource {
            descriptor,
            capability,
            seq,
        });
        self.sources
            .sort_by_key(|s| (s.descriptor.priority, s.seq));
        Ok(())
    }

    /// Look up a source by id
    pub fn get(&self, id: &str) -> Result<&RegisteredSource> {
        self.sources
            .iter()
            .find(|s| s.id() == id)
            .ok_or_else(|| Error::UnknownSource(id.to_string()))
    }

    /// Whether a source with this id is registered
    pub fn contains(&self, id: &str) -> bool {
        self.sources.iter().any(|s| s.id() == id)
    }

    /// Descriptors in ascending priority order
    pub fn all(&self) -> Vec<&SourceDescriptor> {
        self.sources.iter().map(|s| &s.descriptor).collect()
    }

    /// Registered sources in ascending priority order
    pub fn sources(&self) -> &[RegisteredSource] {
        &self.sources
    }

    /// Sources in the allow-list, in priority order
    ///
    /// `None` allows everything. Unknown ids in the list are ignored.
    pub fn enabled(&self, allow: Option<&[String]>) -> Vec<&RegisteredSource> {
        match allow {
            None => self.sources.iter().collect(),
            Some(ids) => {
                for id in ids.iter().filter(|id| !self.contains(id)) {
                    tracing::warn!(source = %id, "enabled source is not registered, ignoring");
                }
                self.sources
                    .iter()
                    .filter(|s| ids.iter().any(|id| id == s.id()))
                    .collect()
            }
        }
    }

    /// Zero-based position of a source in priority order
    pub fn rank_of(&self, id: &str) -> Option<usize> {
        self.sources.iter().position(|s| s.id() == id)
    }

    /// Number of registered sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no source is registered
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Probe every source concurrently, each bounded by `timeout`
    pub async fn check_health(&self, timeout: Duration) -> Vec<HealthReport> {
        let probes = self.sources.iter().map(|source| async move {
            let started = Instant::now();
            let probe = tokio::time::timeout(timeout, source.capability.health_check()).await;
            let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            let (available, message) = match probe {
                Ok(Some(status)) => (Some(status.available), status.message),
                Ok(None) => (None, None),
                Err(_) => (Some(false), Some(format!("health check timed out after {timeout:?}"))),
            };
            if available == Some(false) {
                tracing::warn!(source = %source.id(), ?message, "source unavailable");
            }
            HealthReport {
                source_id: source.id().to_string(),
                available,
                latency_ms,
                message,
            }
        });
        join_all(probes).await
    }
}
