//! Scripted sources shared by unit tests

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{FailureKind, SourceError};
use crate::source::{DownloadOutcome, RawRecord, SourceCapability};

enum SearchScript {
    Records(Vec<RawRecord>),
    Fail(SourceError),
    Hang,
}

enum DownloadScript {
    Write { file_name: String, bytes: Vec<u8> },
    Fail { kind: FailureKind, message: String },
    Flaky { failures: usize, file_name: String, bytes: Vec<u8> },
    Hang,
}

/// A source whose behaviour is fixed up front
pub(crate) struct ScriptedSource {
    search: SearchScript,
    download: DownloadScript,
    delay: Duration,
    search_calls: Arc<AtomicUsize>,
    download_calls: Arc<AtomicUsize>,
}

impl ScriptedSource {
    fn new(search: SearchScript, download: DownloadScript) -> Self {
        Self {
            search,
            download,
            delay: Duration::ZERO,
            search_calls: Arc::new(AtomicUsize::new(0)),
            download_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn returning(records: Vec<RawRecord>) -> Self {
        Self::new(
            SearchScript::Records(records),
            DownloadScript::Fail {
                kind: FailureKind::Unsupported,
                message: "downloads not scripted".into(),
            },
        )
    }

    pub(crate) fn failing(error: SourceError) -> Self {
        Self::new(
            SearchScript::Fail(error),
            DownloadScript::Fail {
                kind: FailureKind::Network,
                message: "connection refused".into(),
            },
        )
    }

    pub(crate) fn hanging() -> Self {
        Self::new(SearchScript::Hang, DownloadScript::Hang)
    }

    pub(crate) fn download_writes(file_name: &str, bytes: &[u8]) -> Self {
        Self::new(
            SearchScript::Records(Vec::new()),
            DownloadScript::Write {
                file_name: file_name.into(),
                bytes: bytes.to_vec(),
            },
        )
    }

    pub(crate) fn download_fails(kind: FailureKind, message: &str) -> Self {
        Self::new(
            SearchScript::Records(Vec::new()),
            DownloadScript::Fail {
                kind,
                message: message.into(),
            },
        )
    }

    pub(crate) fn download_flaky(failures: usize, file_name: &str, bytes: &[u8]) -> Self {
        Self::new(
            SearchScript::Records(Vec::new()),
            DownloadScript::Flaky {
                failures,
                file_name: file_name.into(),
                bytes: bytes.to_vec(),
            },
        )
    }

    /// Delay every call by `delay`
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn search_calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.search_calls)
    }

    pub(crate) fn download_calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.download_calls)
    }
}

async fn write(destination: &Path, file_name: &str, bytes: &[u8]) -> DownloadOutcome {
    let path = destination.join(file_name);
    match tokio::fs::write(&path, bytes).await {
        Ok(()) => DownloadOutcome::ok(path).with_log(vec![format!("wrote {file_name}")]),
        Err(e) => DownloadOutcome::fail(e.to_string()),
    }
}

#[async_trait]
impl SourceCapability for ScriptedSource {
    async fn search(&self, _keyword: &str) -> Result<Vec<RawRecord>, SourceError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.search {
            SearchScript::Records(records) => Ok(records.clone()),
            SearchScript::Fail(err) => Err(err.clone()),
            SearchScript::Hang => std::future::pending().await,
        }
    }

    async fn download(&self, _record: &RawRecord, destination: &Path) -> DownloadOutcome {
        let call = self.download_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.download {
            DownloadScript::Write { file_name, bytes } => write(destination, file_name, bytes).await,
            DownloadScript::Fail { kind, message } => DownloadOutcome::fail_with(*kind, message.clone()),
            DownloadScript::Flaky {
                failures,
                file_name,
                bytes,
            } => {
                if call < *failures {
                    DownloadOutcome::fail_with(FailureKind::Network, "connection reset")
                } else {
                    write(destination, file_name, bytes).await
                }
            }
            DownloadScript::Hang => std::future::pending().await,
        }
    }
}
