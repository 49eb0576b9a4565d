//! # standards-dl
//!
//! Multi-source lookup, merge and retrieval core for document and standard
//! identifiers.
//!
//! ## Design Philosophy
//!
//! standards-dl is designed to be:
//! - **Source-agnostic** - Sources plug in through one async trait
//! - **Failure-tolerant** - One source failing or hanging never fails a search
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use standards_dl::{Aggregator, Config, SourceDescriptor, SourceRegistry};
//! # use standards_dl::source::{DownloadOutcome, RawRecord, SourceCapability};
//! # use standards_dl::error::SourceError;
//! # struct MySource;
//! # #[async_trait::async_trait]
//! # impl SourceCapability for MySource {
//! #     async fn search(&self, _: &str) -> Result<Vec<RawRecord>, SourceError> { Ok(vec![]) }
//! #     async fn download(&self, _: &RawRecord, _: &std::path::Path) -> DownloadOutcome {
//! #         DownloadOutcome::fail("unsupported")
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = SourceRegistry::new();
//!     registry.register(SourceDescriptor::new("main", "Main catalogue", 0), Arc::new(MySource))?;
//!
//!     let aggregator = Aggregator::new(Config::default(), registry)?;
//!
//!     // Subscribe to events
//!     let mut events = aggregator.search().events();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("{:?}: {}", event.event, event.message);
//!         }
//!     });
//!
//!     let task = aggregator.submit_search("GB/T 1.1-2020")?;
//!     let done = aggregator.search().wait(task.id).await?;
//!     println!("{:?}", done.result);
//!
//!     aggregator.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Facade over both task services
pub mod aggregator;
/// Configuration types
pub mod config;
/// Download orchestration with per-source fallback
pub mod download;
/// Error types
pub mod error;
/// Result merging and deduplication
pub mod merge;
/// Identifier normalization
pub mod normalize;
/// Retry logic with exponential backoff
pub mod retry;
/// Search orchestration and fallback policy
pub mod search;
/// Task services (queue, worker pool, events)
pub mod service;
/// Source capability contract and registry
pub mod source;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use aggregator::Aggregator;
pub use config::{
    Config, DownloadConfig, FileCollisionAction, RetryConfig, SearchConfig, SearchStrategy,
    WorkerConfig,
};
pub use download::{Artifact, DownloadOrchestrator, DownloadRequest};
pub use error::{
    DownloadFailure, Error, FailureKind, NoResultError, Result, SourceError, TaskFailure,
};
pub use merge::{CanonicalRecord, merge_records};
pub use normalize::{NormalizedKey, normalize};
pub use search::{FallbackPolicy, SearchOrchestrator, SearchOutcome, SearchQuery, Strategy};
pub use service::{
    DownloadTaskService, Job, JobContext, JobError, SearchTaskService, SubscriptionId,
    TaskService,
};
pub use source::{
    DownloadOutcome, RawRecord, SourceCapability, SourceDescriptor, SourceRegistry,
};
pub use types::{EventType, Priority, Task, TaskEvent, TaskId, TaskKind, TaskStatus};

/// Helper function to run the aggregator with graceful signal handling.
///
/// Waits for a termination signal and then calls the aggregator's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use standards_dl::{Aggregator, Config, SourceRegistry, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let aggregator = Aggregator::new(Config::default(), SourceRegistry::new())?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(aggregator).await;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(aggregator: Aggregator) {
    wait_for_signal().await;
    aggregator.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            match signal(SignalKind::interrupt()) {
                Ok(mut sigint) => {
                    sigint.recv().await;
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
                Err(_) => {
                    tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                    tokio::signal::ctrl_c().await.ok();
                }
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM signal");
                }
                Err(_) => {
                    tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                    tokio::signal::ctrl_c().await.ok();
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
