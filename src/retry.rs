//! Retry logic with exponential backoff
//!
//! This is the shared transport retry policy: token exchanges and source
//! listings go through [`with_retry`]. Per-record order lookups do not.
//!
//! # Example
//!
//! ```no_run
//! use feed_landing::retry::{IsRetryable, with_retry};
//! use feed_landing::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self, _statuses: &[u16]) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! with_retry(&config, || async { Ok::<_, MyError>(()) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// `statuses` is the configured set of HTTP statuses treated as transient.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self, statuses: &[u16]) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self, statuses: &[u16]) -> bool {
        match self {
            Error::Network(e) => {
                if let Some(status) = e.status() {
                    statuses.contains(&status.as_u16())
                } else {
                    e.is_timeout() || e.is_connect()
                }
            }
            Error::HttpStatus { status, .. } => statuses.contains(status),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            // Everything else is a permanent failure of configuration, data or credentials
            Error::ConfigurationMissing { .. }
            | Error::SecretUnavailable { .. }
            | Error::HostKeyUnavailable { .. }
            | Error::HostKeyMismatch { .. }
            | Error::RemoteConnectFailed { .. }
            | Error::AuthenticationFailed { .. }
            | Error::RemoteListingFailed { .. }
            | Error::RemoteTransferFailed { .. }
            | Error::SourceFetchFailed(_)
            | Error::StorageCheckFailed { .. }
            | Error::StorageWriteFailed { .. }
            | Error::InvalidFileName(_)
            | Error::InvalidSyncDate { .. }
            | Error::MissingColumn(_)
            | Error::Csv(_)
            | Error::Serialization(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Tries once, then up to `config.max_attempts` more times while the error is
/// retryable. Returns the successful result or the last error.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable(&config.retry_statuses) && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                let wait = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };
                tokio::time::sleep(wait).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable(&config.retry_statuses) {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Jitter is uniform between 0% and 100% of the delay
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
