//! Test configuration helpers

use std::path::Path;
use std::time::Duration;
use standards_dl::{Config, RetryConfig};

/// A config with short timeouts and no retries, downloading into `dir`
pub fn fast_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.search.source_timeout = Duration::from_millis(300);
    config.search.operation_timeout = Duration::from_millis(600);
    config.download.download_dir = dir.to_path_buf();
    config.download.attempt_timeout = Duration::from_millis(300);
    config.download.task_timeout = Duration::from_secs(2);
    config.retry = RetryConfig::disabled();
    config.workers.search_workers = 2;
    config.workers.download_workers = 2;
    config
}
