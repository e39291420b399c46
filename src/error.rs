//! Error types for replicate-dl
//!
//! This module provides the error taxonomy of the job orchestration client:
//! - Submission rejections, kept apart from transport failures
//! - Poll outcomes that are not service-reported (timeout, cancellation)
//! - Retrieval and persistence failures for artifacts of succeeded jobs
//! - Machine-readable codes for monitoring and reporting

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for replicate-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for replicate-dl
///
/// Every pipeline failure recorded in a [`BatchResult`](crate::BatchResult) is one of
/// these variants. None of them is process-fatal.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "batch.concurrency_limit")
        key: Option<String>,
    },

    /// The service rejected the submission (malformed parameters, auth, quota)
    #[error("submission rejected: {0}")]
    Submission(#[from] SubmissionError),

    /// Network-level failure talking to the service
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Attempt budget exhausted while the job was still pending
    ///
    /// The remote job may still complete server-side; this is not a failure report.
    #[error("job {job_id} did not reach a terminal state after {attempts} status queries")]
    PollTimeout {
        /// Remote job identifier
        job_id: String,
        /// Number of status queries issued
        attempts: u32,
    },

    /// The service reported that the job failed
    #[error("job {job_id} failed: {reason}")]
    RemoteJobFailure {
        /// Remote job identifier
        job_id: String,
        /// Failure reason exactly as reported by the service
        reason: String,
    },

    /// Artifact retrieval failed after the job succeeded
    #[error("artifact fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Retrieved artifact could not be handed to its sink
    #[error("artifact store failed: {0}")]
    Store(#[from] StoreError),

    /// Pipeline abandoned because cancellation was requested
    #[error("cancelled{}", waiting_for(.job_id))]
    Cancelled {
        /// Remote job identifier, if the job had been submitted
        job_id: Option<String>,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Rejection of a submission by the remote service (any non-2xx reply)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("HTTP {status}: {body}")]
pub struct SubmissionError {
    /// HTTP status code
    pub status: u16,
    /// Raw response body, captured verbatim for diagnostics
    pub body: String,
}

/// Network-level and protocol-level failures
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.)
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered a status or download request with a non-2xx code
    #[error("unexpected HTTP status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Raw response body for debugging
        body: String,
    },

    /// The response body could not be decoded
    #[error("malformed response: {0}")]
    Decode(String),

    /// A result location is not a valid URI
    #[error("invalid URI {uri:?}: {reason}")]
    InvalidUri {
        /// The offending URI string
        uri: String,
        /// Parser message
        reason: String,
    },
}

/// Failure retrieving one artifact of a succeeded job
#[derive(Debug, Error)]
#[error("failed to fetch {uri}: {cause}")]
pub struct FetchError {
    /// Location that could not be retrieved
    pub uri: String,
    /// Underlying transport failure
    #[source]
    pub cause: TransportError,
}

/// Failure handing an artifact to its sink
#[derive(Debug, Error)]
#[error("{}: {reason}", store_target(.path))]
pub struct StoreError {
    /// Destination path, for file-backed sinks
    pub path: Option<PathBuf>,
    /// The reason the store failed
    pub reason: String,
}

fn waiting_for(job_id: &Option<String>) -> String {
    match job_id {
        Some(id) => format!(" while waiting for job {id}"),
        None => String::new(),
    }
}

fn store_target(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => "<sink>".to_string(),
    }
}

impl Error {
    /// Stable machine-readable code for this error
    ///
    /// Clients can use this for monitoring and programmatic handling.
    /// A timeout (`poll_timeout`) is never reported as `remote_job_failure`.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Submission(_) => "submission_rejected",
            Error::Transport(_) => "transport_error",
            Error::PollTimeout { .. } => "poll_timeout",
            Error::RemoteJobFailure { .. } => "remote_job_failure",
            Error::Fetch(_) => "fetch_failed",
            Error::Store(_) => "store_failed",
            Error::Cancelled { .. } => "cancelled",
            Error::Other(_) => "internal_error",
        }
    }

    /// Create a configuration error for the given key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}
