//! Retry logic with exponential backoff
//!
//! Two flavours are provided:
//! - [`with_retry`] runs an async operation in place, sleeping between attempts.
//!   Used for small component-internal calls (descriptor fetches, thumbnails)
//!   whose transient failures should never surface.
//! - [`backoff_delay`] computes the delay before attempt `n` without sleeping.
//!   The download scheduler and sync worker use it to schedule later attempts
//!   so that no loop ever blocks on a backoff.
//!
//! # Example
//!
//! ```no_run
//! use offline_sync::catalog::CatalogAdapter;
//! use offline_sync::config::RetryConfig;
//! use offline_sync::retry::with_retry;
//! use offline_sync::{CatalogError, ContentDescriptor, ContentId, ContentKind};
//!
//! # async fn example(catalog: &dyn CatalogAdapter) -> Result<ContentDescriptor, CatalogError> {
//! let id = ContentId::new(ContentKind::Lesson, "ownership");
//! let descriptor = with_retry(&RetryConfig::default(), || catalog.fetch_content_descriptor(&id)).await?;
//! # Ok(descriptor)
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{CatalogError, DownloadError, Error};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, stalled transfers) return `true`.
/// Permanent failures (budget exceeded, invalid state, rejected mutation) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for CatalogError {
    fn is_retryable(&self) -> bool {
        match self {
            CatalogError::Transient(_) => true,
            CatalogError::NotFound(_) | CatalogError::Rejected(_) => false,
            CatalogError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_body()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Catalog(e) => e.is_retryable(),
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            // A stall or a truncated stream is a transport problem
            Error::Download(DownloadError::Stalled { .. })
            | Error::Download(DownloadError::SizeMismatch { .. }) => true,
            Error::Download(DownloadError::NotFound { .. })
            | Error::Download(DownloadError::InvalidState { .. }) => false,
            // Needs the user to free space
            Error::Storage(_) => false,
            Error::Sync(_) => false,
            Error::Database(_) | Error::Sqlx(_) => false,
            Error::Config { .. } => false,
            Error::Serialization(_) => false,
            Error::CorruptState { .. } => false,
            Error::NotFound(_) => false,
            Error::ShuttingDown => false,
            Error::Other(_) => false,
        }
    }
}

/// Delay before retry number `attempt` (1-based), without jitter applied twice.
///
/// `initial_delay * backoff_multiplier^(attempt - 1)`, capped at `max_delay`,
/// then jittered into `[delay, 2 * delay]` when jitter is enabled.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let raw = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    // Compared in seconds first: large attempts overflow Duration
    let capped = if raw.is_finite() && raw < config.max_delay.as_secs_f64() {
        Duration::from_secs_f64(raw.max(0.0))
    } else {
        config.max_delay
    };

    if config.jitter {
        add_jitter(capped)
    } else {
        capped
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Returns the successful result or the last error after `config.max_attempts`
/// retries are exhausted. Non-retryable errors are returned immediately.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;
                let delay = backoff_delay(config, attempt);

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
