//! Bounded status polling for submitted jobs
//!
//! A poll issues at most `max_attempts` status queries, sleeping `interval`
//! between them, and stops at the first terminal status. Running out of
//! attempts is reported as [`PollError::Timeout`], which is never confused with
//! a failure reported by the service.

use crate::config::{Credential, PollConfig};
use crate::service::JobService;
use crate::types::{JobHandle, JobStatus};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Terminal status reached by a poll
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollReport {
    /// Terminal status (`Succeeded` or `Failed`)
    pub status: JobStatus,
    /// Status queries issued, including the one that saw the terminal status
    pub attempts: u32,
    /// Status strings the service sent that this client does not know
    pub warnings: Vec<PollWarning>,
}

/// An unrecognized status seen during a poll
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollWarning {
    /// 1-based query number
    pub attempt: u32,
    /// Status string as sent
    pub status: String,
}

impl std::fmt::Display for PollWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unrecognized status {:?} on attempt {}, treated as running",
            self.status, self.attempt
        )
    }
}

/// Poll ended without a terminal status
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PollError {
    /// Attempt budget or deadline exhausted
    #[error("no terminal status after {attempts} queries")]
    Timeout {
        /// Status queries issued
        attempts: u32,
    },
    /// Cancellation was requested
    #[error("cancelled after {attempts} queries")]
    Cancelled {
        /// Status queries issued
        attempts: u32,
    },
}

impl PollError {
    /// Status queries issued before the poll ended
    pub fn attempts(&self) -> u32 {
        match self {
            PollError::Timeout { attempts } | PollError::Cancelled { attempts } => *attempts,
        }
    }
}

/// Polls a job until it reaches a terminal status
#[derive(Clone)]
pub struct StatusPoller {
    service: Arc<dyn JobService>,
    config: PollConfig,
}

impl StatusPoller {
    /// Create a poller over any job service
    pub fn new(service: Arc<dyn JobService>, config: PollConfig) -> Self {
        Self { service, config }
    }

    /// Polling budget in use
    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll `handle` until terminal, out of attempts, past the deadline, or cancelled
    ///
    /// Transport errors on individual queries are logged and consume an attempt.
    /// No sleep follows the final attempt.
    pub async fn poll(
        &self,
        handle: &JobHandle,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<PollReport, PollError> {
        let deadline = self.config.deadline.map(|d| Instant::now() + d);
        let mut warnings = Vec::new();
        let mut attempts = 0;

        while attempts < self.config.max_attempts {
            if cancel.is_cancelled() {
                return Err(PollError::Cancelled { attempts });
            }

            attempts += 1;
            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PollError::Cancelled { attempts }),
                _ = wait_until(deadline) => return Err(PollError::Timeout { attempts }),
                reply = self.service.status(handle, credential) => reply,
            };

            match reply {
                Ok(reading) => {
                    if !reading.recognized {
                        tracing::warn!(
                            job_id = %handle.id,
                            attempt = attempts,
                            status = %reading.raw,
                            "Unrecognized job status, treating as running"
                        );
                        warnings.push(PollWarning {
                            attempt: attempts,
                            status: reading.raw,
                        });
                    }

                    if reading.status.is_terminal() {
                        tracing::debug!(
                            job_id = %handle.id,
                            attempts = attempts,
                            "Job reached terminal status"
                        );
                        return Ok(PollReport {
                            status: reading.status,
                            attempts,
                            warnings,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %handle.id,
                        attempt = attempts,
                        error = %e,
                        "Status query failed"
                    );
                }
            }

            if attempts == self.config.max_attempts {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PollError::Cancelled { attempts }),
                _ = wait_until(deadline) => return Err(PollError::Timeout { attempts }),
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        tracing::warn!(
            job_id = %handle.id,
            attempts = attempts,
            "Polling budget exhausted before job reached a terminal status"
        );
        Err(PollError::Timeout { attempts })
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
