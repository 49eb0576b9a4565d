//! Fake sources with fixed behaviour

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use standards_dl::error::{FailureKind, SourceError};
use standards_dl::source::{DownloadOutcome, RawRecord, SourceCapability};
use standards_dl::{SourceDescriptor, SourceRegistry};

enum SearchBehaviour {
    Records(Vec<RawRecord>),
    Fail(SourceError),
    Hang,
}

enum DownloadBehaviour {
    Write { file_name: String, bytes: Vec<u8> },
    Fail { kind: FailureKind, message: String },
    Hang,
}

/// A source that answers the same way every time
pub struct FakeSource {
    search: SearchBehaviour,
    download: DownloadBehaviour,
    delay: Duration,
    search_calls: Arc<AtomicUsize>,
    download_calls: Arc<AtomicUsize>,
}

impl FakeSource {
    fn with_search(search: SearchBehaviour) -> Self {
        Self {
            search,
            download: DownloadBehaviour::Fail {
                kind: FailureKind::Unsupported,
                message: "no artifact".into(),
            },
            delay: Duration::ZERO,
            search_calls: Arc::new(AtomicUsize::new(0)),
            download_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Search returns `records`
    pub fn records(records: Vec<RawRecord>) -> Self {
        Self::with_search(SearchBehaviour::Records(records))
    }

    /// Search returns nothing
    pub fn empty() -> Self {
        Self::records(Vec::new())
    }

    /// Search fails with a connection error
    pub fn failing(message: &str) -> Self {
        Self::with_search(SearchBehaviour::Fail(SourceError::Connection(message.into())))
    }

    /// Search and download never return
    pub fn hanging() -> Self {
        let mut source = Self::with_search(SearchBehaviour::Hang);
        source.download = DownloadBehaviour::Hang;
        source
    }

    /// Delay every call
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Download writes `bytes` to `file_name` in the destination
    pub fn downloads(mut self, file_name: &str, bytes: &[u8]) -> Self {
        self.download = DownloadBehaviour::Write {
            file_name: file_name.into(),
            bytes: bytes.to_vec(),
        };
        self
    }

    /// Download fails with `kind`
    pub fn download_fails(mut self, kind: FailureKind, message: &str) -> Self {
        self.download = DownloadBehaviour::Fail {
            kind,
            message: message.into(),
        };
        self
    }

    /// Download never returns
    pub fn download_hangs(mut self) -> Self {
        self.download = DownloadBehaviour::Hang;
        self
    }

    /// Counter of search calls
    pub fn search_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.search_calls)
    }

    /// Counter of download calls
    pub fn download_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.download_calls)
    }
}

#[async_trait]
impl SourceCapability for FakeSource {
    async fn search(&self, _keyword: &str) -> Result<Vec<RawRecord>, SourceError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.search {
            SearchBehaviour::Records(records) => Ok(records.clone()),
            SearchBehaviour::Fail(err) => Err(err.clone()),
            SearchBehaviour::Hang => std::future::pending().await,
        }
    }

    async fn download(&self, _record: &RawRecord, destination: &Path) -> DownloadOutcome {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.download {
            DownloadBehaviour::Write { file_name, bytes } => {
                let path = destination.join(file_name);
                match tokio::fs::write(&path, bytes).await {
                    Ok(()) => DownloadOutcome::ok(path),
                    Err(e) => DownloadOutcome::fail(e.to_string()),
                }
            }
            DownloadBehaviour::Fail { kind, message } => {
                DownloadOutcome::fail_with(*kind, message.clone())
            }
            DownloadBehaviour::Hang => std::future::pending().await,
        }
    }
}

/// A raw record from `source`
pub fn record(source: &str, identifier: &str, name: &str) -> RawRecord {
    RawRecord::new(source, identifier, name)
}

/// Register `(id, priority, source)` triples, name = id in upper case
pub fn registry(entries: Vec<(&str, i32, FakeSource)>) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    for (id, priority, source) in entries {
        registry
            .register(
                SourceDescriptor::new(id, id.to_uppercase(), priority),
                Arc::new(source),
            )
            .unwrap_or_else(|e| panic!("failed to register {id}: {e}"));
    }
    registry
}
