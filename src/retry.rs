//! Retry logic with exponential backoff
//!
//! Download attempts against a single source are retried on transient failures
//! before the orchestrator moves on to the next source. Backoff is exponential
//! with optional jitter.
//!
//! # Example
//!
//! ```no_run
//! use standards_dl::retry::{IsRetryable, with_retry};
//! use standards_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum FetchError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for FetchError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for FetchError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, FetchError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), FetchError> {
//! let config = RetryConfig::default();
//! with_retry(&config, || async { Ok::<_, FetchError>(()) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{DownloadFailure, Error, FailureKind, SourceError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, refused or reset connections) return `true`.
/// Permanent failures (unknown identifier, corrupt artifact, cancellation) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for SourceError {
    fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Connection(_) | SourceError::Timeout(_))
    }
}

impl IsRetryable for DownloadFailure {
    fn is_retryable(&self) -> bool {
        self.kind == FailureKind::Network
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Source(e) => e.is_retryable(),
            Error::Download(e) => e.is_retryable(),
            Error::Timeout(_) => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // Cancellation must end the attempt immediately
            Error::Cancelled | Error::ShuttingDown => false,
            Error::Config { .. }
            | Error::DuplicateSource(_)
            | Error::UnknownSource(_)
            | Error::UnknownTask(_)
            | Error::NoSourcesEnabled
            | Error::InvalidState { .. }
            | Error::FileCollision { .. }
            | Error::InvalidPath { .. }
            | Error::Other(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// `config.max_attempts` counts retries, so the operation runs at most
/// `max_attempts + 1` times. Returns the successful result or the last error.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    with_retry_until(config, &CancellationToken::new(), operation).await
}

/// Like [`with_retry`], but gives up during a backoff wait once `cancel` fires.
///
/// The last error is returned as is, so callers check the token to tell a
/// cancelled retry from an exhausted one.
pub async fn with_retry_until<F, Fut, T, E>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay.min(config.max_delay);

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "operation failed, retrying"
                );

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = cancel.cancelled() => {
                        tracing::debug!(error = %e, attempt, "retry abandoned, cancelled during backoff");
                        return Err(e);
                    }
                }

                delay = next_delay(delay, config);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::debug!(error = %e, attempts = attempt + 1, "retries exhausted");
                } else {
                    tracing::debug!(error = %e, "non-retryable failure");
                }
                return Err(e);
            }
        }
    }
}

/// Multiply by the backoff factor, clamped to `max_delay`.
fn next_delay(delay: Duration, config: &RetryConfig) -> Duration {
    let scaled = delay.as_secs_f64() * config.backoff_multiplier;
    if !scaled.is_finite() || scaled >= config.max_delay.as_secs_f64() {
        return config.max_delay;
    }
    Duration::try_from_secs_f64(scaled)
        .unwrap_or(config.max_delay)
        .min(config.max_delay)
}

/// Jitter is uniform between 0% and 100% of the delay, so the result lies in `[delay, 2 * delay]`.
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + factor)).unwrap_or(delay)
}
