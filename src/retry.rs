//! Retry logic with exponential backoff
//!
//! Submissions are single-attempt by contract. Callers that want to resubmit
//! after a transport failure wrap the call with [`with_retry`]; rejections by
//! the service are never retried.
//!
//! # Example
//!
//! ```no_run
//! use replicate_dl::retry::with_retry;
//! use replicate_dl::config::{ApiConfig, Credential, RetryConfig};
//! use replicate_dl::{GenerationRequest, JobClient, JobService};
//!
//! # async fn example() -> replicate_dl::Result<()> {
//! let client = JobClient::new(&ApiConfig::default())?;
//! let credential = Credential::from_env()?;
//! let request = GenerationRequest::new("icon", "a chart icon");
//! let handle = with_retry(&RetryConfig::default(), || client.submit(&request, &credential)).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, TransportError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, refused connections, 5xx, 429) return `true`.
/// Permanent failures (rejected submission, decode errors, bad URIs) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for TransportError {
    fn is_retryable(&self) -> bool {
        match self {
            TransportError::Request(e) => e.is_timeout() || e.is_connect(),
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
            TransportError::Decode(_) => false,
            TransportError::InvalidUri { .. } => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_retryable(),
            // The service looked at the request and said no
            Error::Submission(_) => false,
            Error::Fetch(e) => e.cause.is_retryable(),
            Error::Config { .. }
            | Error::PollTimeout { .. }
            | Error::RemoteJobFailure { .. }
            | Error::Store(_)
            | Error::Cancelled { .. }
            | Error::Other(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// # Arguments
///
/// * `config` - Retry configuration (max attempts, delays, backoff multiplier, jitter)
/// * `operation` - Async closure that returns Result<T, E> where E implements IsRetryable
///
/// # Returns
///
/// Returns the successful result or the last error after all retry attempts are exhausted.
/// With `max_attempts == 0` the operation runs exactly once.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    with_retry_until(config, &CancellationToken::new(), operation).await
}

/// [`with_retry`] that gives up once `cancel` fires
///
/// Cancellation is observed between attempts only: an attempt already in flight
/// runs to completion, and no new attempt starts after the token is cancelled.
/// When retrying is abandoned this way the last error is returned.
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
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!(attempts = attempt, "Retry abandoned on cancellation");
                        return Err(e);
                    }
                    _ = tokio::time::sleep(jittered_delay) => {}
                }

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() && attempt > 0 {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
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
