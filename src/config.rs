//! Configuration types for standards-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Main configuration
///
/// Every field has a serde default, so an empty JSON object is a valid config.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source ids enabled for operations (None = every registered source)
    #[serde(default)]
    pub enabled_sources: Option<Vec<String>>,

    /// Search orchestration settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Download orchestration settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Per-source download retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Task service settings
    #[serde(default)]
    pub workers: WorkerConfig,
}

impl Config {
    /// Check every sub-config, reporting the first invalid key
    pub fn validate(&self) -> Result<()> {
        if let Some(ids) = &self.enabled_sources {
            if ids.is_empty() {
                return Err(Error::config(
                    "enabled_sources must list at least one source when present",
                    "enabled_sources",
                ));
            }
            if ids.iter().any(|id| id.trim().is_empty()) {
                return Err(Error::config(
                    "source ids must not be blank",
                    "enabled_sources",
                ));
            }
        }
        self.search.validate()?;
        self.download.validate()?;
        self.retry.validate()?;
        self.workers.validate()
    }
}

/// How a search chooses between fan-out and fallback
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Classify the query: broad queries fan out, narrow ones fall back (default)
    #[default]
    Auto,
    /// Always query every enabled source concurrently
    Parallel,
    /// Always query sources one by one in priority order
    Sequential,
}

/// Search orchestration configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Upper bound on a single source call (default: 10 seconds)
    #[serde(default = "default_search_source_timeout", with = "duration_serde")]
    pub source_timeout: Duration,

    /// Upper bound on the whole search (default: 15 seconds)
    #[serde(default = "default_search_timeout", with = "duration_serde")]
    pub operation_timeout: Duration,

    /// Strategy selection (default: auto)
    #[serde(default)]
    pub strategy: SearchStrategy,

    /// Patterns marking a query as broad (case-insensitive regexes)
    ///
    /// Defaults to the national-standard prefixes GB, GB/T and GBT followed by a number.
    #[serde(default = "default_broad_patterns")]
    pub broad_patterns: Vec<String>,

    /// Patterns that veto a broad classification (case-insensitive regexes)
    ///
    /// Defaults to the sector prefixes QB/T, WB/T, HB/T and JC/T, with or without the slash.
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            source_timeout: default_search_source_timeout(),
            operation_timeout: default_search_timeout(),
            strategy: SearchStrategy::default(),
            broad_patterns: default_broad_patterns(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

impl SearchConfig {
    fn validate(&self) -> Result<()> {
        if self.source_timeout.is_zero() {
            return Err(Error::config(
                "source_timeout must be greater than 0",
                "search.source_timeout",
            ));
        }
        if self.operation_timeout.is_zero() {
            return Err(Error::config(
                "operation_timeout must be greater than 0",
                "search.operation_timeout",
            ));
        }
        if self.operation_timeout < self.source_timeout {
            return Err(Error::config(
                "operation_timeout must not be shorter than source_timeout",
                "search.operation_timeout",
            ));
        }
        Ok(())
    }
}

/// Download orchestration configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Default destination directory (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Upper bound on a single source attempt (default: 30 seconds)
    #[serde(default = "default_attempt_timeout", with = "duration_serde")]
    pub attempt_timeout: Duration,

    /// Upper bound on the whole retrieval (default: 60 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub task_timeout: Duration,

    /// Rename artifacts to "<identifier> <name>.<ext>" (default: false)
    #[serde(default)]
    pub rename_artifacts: bool,

    /// What to do when a renamed artifact would overwrite an existing file
    #[serde(default)]
    pub file_collision: FileCollisionAction,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            attempt_timeout: default_attempt_timeout(),
            task_timeout: default_download_timeout(),
            rename_artifacts: false,
            file_collision: FileCollisionAction::default(),
        }
    }
}

impl DownloadConfig {
    fn validate(&self) -> Result<()> {
        if self.attempt_timeout.is_zero() {
            return Err(Error::config(
                "attempt_timeout must be greater than 0",
                "download.attempt_timeout",
            ));
        }
        if self.task_timeout.is_zero() {
            return Err(Error::config(
                "task_timeout must be greater than 0",
                "download.task_timeout",
            ));
        }
        if self.download_dir.as_os_str().is_empty() {
            return Err(Error::config(
                "download_dir must not be empty",
                "download.download_dir",
            ));
        }
        Ok(())
    }
}

/// File collision handling strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename (default)
    #[default]
    Rename,
    /// Overwrite existing file
    Overwrite,
    /// Leave the existing file alone and keep the artifact under its original name
    Skip,
}

/// Retry configuration for transient download failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries per source (default: 2)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds (default: 500)
    #[serde(default = "default_initial_delay", with = "duration_millis_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries in milliseconds (default: 10000)
    #[serde(default = "default_max_delay", with = "duration_millis_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "backoff_multiplier must be a finite number >= 1.0",
                "retry.backoff_multiplier",
            ));
        }
        if self.initial_delay > self.max_delay {
            return Err(Error::config(
                "initial_delay must be <= max_delay",
                "retry.initial_delay",
            ));
        }
        Ok(())
    }
}

/// Task service configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Concurrent search tasks (default: 3)
    #[serde(default = "default_workers")]
    pub search_workers: usize,

    /// Concurrent download tasks (default: 3)
    #[serde(default = "default_workers")]
    pub download_workers: usize,

    /// Event channel capacity per service (default: 1000)
    ///
    /// Receivers that fall further behind than this miss events.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            search_workers: default_workers(),
            download_workers: default_workers(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl WorkerConfig {
    fn validate(&self) -> Result<()> {
        if self.search_workers == 0 {
            return Err(Error::config(
                "search_workers must be greater than 0",
                "workers.search_workers",
            ));
        }
        if self.download_workers == 0 {
            return Err(Error::config(
                "download_workers must be greater than 0",
                "workers.download_workers",
            ));
        }
        if self.event_buffer == 0 {
            return Err(Error::config(
                "event_buffer must be greater than 0",
                "workers.event_buffer",
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_search_source_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_search_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_attempt_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_broad_patterns() -> Vec<String> {
    vec![r"\b(?:GB/T|GB|GBT)\s*\d+".to_string()]
}

fn default_exclude_patterns() -> Vec<String> {
    vec![r"(?:QB|WB|HB|JC)/?T".to_string()]
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_workers() -> usize {
    3
}

fn default_event_buffer() -> usize {
    1000
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
