//! One-stop facade over the search and download services

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::download::{Artifact, DownloadOrchestrator, DownloadRequest};
use crate::error::Result;
use crate::merge::CanonicalRecord;
use crate::search::{SearchOrchestrator, SearchOutcome, SearchQuery};
use crate::service::{DownloadJob, DownloadTaskService, SearchJob, SearchTaskService};
use crate::source::{HealthReport, SourceRegistry};
use crate::types::{Priority, Task};

/// Both task services wired to one registry and one configuration
///
/// Cloning is cheap; clones share the services.
#[derive(Clone, Debug)]
pub struct Aggregator {
    config: Arc<Config>,
    registry: Arc<SourceRegistry>,
    search: SearchTaskService,
    downloads: DownloadTaskService,
}

impl Aggregator {
    /// Validate `config`, build both services and start them
    ///
    /// Must be called from within a Tokio runtime. The registry is frozen
    /// from here on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the configuration is invalid.
    pub fn new(config: Config, registry: SourceRegistry) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(registry);

        let search = SearchTaskService::new(
            SearchJob::new(SearchOrchestrator::new(
                Arc::clone(&registry),
                &config.search,
                config.enabled_sources.clone(),
            )),
            config.workers.search_workers,
            config.workers.event_buffer,
        );
        let downloads = DownloadTaskService::new(
            DownloadJob::new(DownloadOrchestrator::new(
                Arc::clone(&registry),
                &config.download,
                &config.retry,
            )),
            config.workers.download_workers,
            config.workers.event_buffer,
        );

        search.start()?;
        downloads.start()?;
        tracing::info!(
            sources = registry.len(),
            search_workers = config.workers.search_workers,
            download_workers = config.workers.download_workers,
            "aggregator started"
        );

        Ok(Self {
            config: Arc::new(config),
            registry,
            search,
            downloads,
        })
    }

    /// The search task service
    pub fn search(&self) -> &SearchTaskService {
        &self.search
    }

    /// The download task service
    pub fn downloads(&self) -> &DownloadTaskService {
        &self.downloads
    }

    /// The source registry
    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// The configuration in effect
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Submit a search for `keyword` across the enabled sources
    pub fn submit_search(
        &self,
        keyword: impl Into<String>,
    ) -> Result<Task<SearchQuery, SearchOutcome>> {
        self.search.submit(SearchQuery::new(keyword))
    }

    /// Submit a download of `record` into the configured download directory
    pub fn submit_download(
        &self,
        record: CanonicalRecord,
    ) -> Result<Task<DownloadRequest, Artifact>> {
        self.submit_download_to(record, self.config.download.download_dir.clone(), Priority::Normal)
    }

    /// Submit a download of `record` into `destination`
    pub fn submit_download_to(
        &self,
        record: CanonicalRecord,
        destination: impl Into<PathBuf>,
        priority: Priority,
    ) -> Result<Task<DownloadRequest, Artifact>> {
        self.downloads
            .submit_with_priority(DownloadRequest::new(record, destination), priority)
    }

    /// Probe every source's health, each bounded by the per-source search timeout
    pub async fn check_health(&self) -> Vec<HealthReport> {
        self.registry
            .check_health(self.config.search.source_timeout)
            .await
    }

    /// Shut down both services
    pub async fn shutdown(&self) {
        tokio::join!(self.search.shutdown(), self.downloads.shutdown());
        tracing::info!("aggregator shut down");
    }
}
