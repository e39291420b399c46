//! # replicate-dl
//!
//! Client library for asynchronous image-generation jobs on a Replicate-style
//! prediction service.
//!
//! ## Design Philosophy
//!
//! replicate-dl is designed to be:
//! - **Bounded** - Every poll has an attempt budget; a timeout is never mistaken for a failure
//! - **Fault-isolated** - One failing request never affects the rest of its batch
//! - **Library-first** - No CLI; credentials and settings are passed in explicitly
//! - **Event-driven** - Consumers can subscribe to pipeline events
//!
//! ## Quick Start
//!
//! ```no_run
//! use replicate_dl::{BatchOrchestrator, Config, Credential, GenerationRequest, cancel_on_signal};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let orchestrator = BatchOrchestrator::new(config.clone(), Credential::from_env()?)?;
//!
//!     // Subscribe to events
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Stop admitting new jobs on Ctrl+C
//!     let cancel = CancellationToken::new();
//!     tokio::spawn(cancel_on_signal(cancel.clone()));
//!
//!     let requests = vec![
//!         GenerationRequest::new("icon-analytics", "minimal analytics icon, flat, blue"),
//!         GenerationRequest::new("icon-security", "minimal shield icon, flat, green"),
//!     ];
//!     let result = orchestrator.run_batch(requests, &config.batch, cancel).await?;
//!     println!("{} succeeded, {} failed", result.succeeded(), result.failed());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// HTTP client for the prediction service
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Artifact retrieval
pub mod fetcher;
/// Batch orchestration
pub mod orchestrator;
/// Admission pacing
pub mod pacing;
/// Status polling
pub mod poller;
/// Retry logic with exponential backoff
pub mod retry;
/// Service traits
pub mod service;
/// Artifact sinks
pub mod sink;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use client::JobClient;
pub use config::{BatchConfig, Config, Credential, PollConfig, RetryConfig};
pub use error::{Error, FetchError, Result, StoreError, SubmissionError, TransportError};
pub use fetcher::ArtifactFetcher;
pub use orchestrator::BatchOrchestrator;
pub use poller::{PollError, PollReport, StatusPoller};
pub use service::{ArtifactSource, JobService};
pub use sink::{ArtifactSink, FileSink, MemorySink};
pub use types::{
    Artifact, BatchResult, Event, GenerationRequest, JobHandle, JobStatus, OutputFormat,
    Outcome, RequestId, StatusReading, StoredArtifact,
};

use tokio_util::sync::CancellationToken;

/// Cancel `token` when the process receives a termination signal.
///
/// Pair it with [`BatchOrchestrator::run_batch`] to stop admitting new jobs and
/// abandon in-flight polls on Ctrl+C.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Returns early, without waiting for a signal, if the token is cancelled elsewhere.
pub async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        _ = token.cancelled() => {}
        _ = wait_for_signal() => {
            tracing::info!("Cancelling batch");
            token.cancel();
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
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
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
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
