//! One request's pipeline: submit, poll, fetch, store.

use crate::config::{Credential, RetryConfig};
use crate::error::{Error, Result};
use crate::fetcher::ArtifactFetcher;
use crate::poller::{PollError, StatusPoller};
use crate::retry::{IsRetryable, with_retry_until};
use crate::service::JobService;
use crate::sink::ArtifactSink;
use crate::types::{Event, GenerationRequest, JobHandle, JobStatus, Outcome};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Everything a pipeline task owns while it runs
pub(super) struct PipelineContext {
    pub(super) request: GenerationRequest,
    pub(super) service: Arc<dyn JobService>,
    pub(super) poller: StatusPoller,
    pub(super) fetcher: ArtifactFetcher,
    pub(super) sink: Arc<dyn ArtifactSink>,
    pub(super) credential: Credential,
    pub(super) submit_retry: RetryConfig,
    pub(super) cancel_remote_on_abort: bool,
    pub(super) event_tx: broadcast::Sender<Event>,
    pub(super) cancel: CancellationToken,
}

impl PipelineContext {
    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

/// Run the pipeline to an outcome; never panics on service errors
pub(super) async fn run_pipeline(ctx: PipelineContext) -> Outcome {
    match execute(&ctx).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(
                request_id = %ctx.request.id(),
                code = e.code(),
                error = %e,
                "Pipeline failed"
            );
            ctx.emit(Event::PipelineFailed {
                id: ctx.request.id().clone(),
                code: e.code().to_string(),
                error: e.to_string(),
            });
            Outcome::Failed(e)
        }
    }
}

async fn execute(ctx: &PipelineContext) -> Result<Outcome> {
    let request_id = ctx.request.id();

    if ctx.cancel.is_cancelled() {
        return Err(Error::Cancelled { job_id: None });
    }

    let submitted = with_retry_until(&ctx.submit_retry, &ctx.cancel, || {
        ctx.service.submit(&ctx.request, &ctx.credential)
    })
    .await;
    let handle = match submitted {
        Ok(handle) => handle,
        // Retrying was cut short; nothing was created remotely
        Err(e) if ctx.cancel.is_cancelled() && e.is_retryable() => {
            tracing::info!(
                request_id = %request_id,
                error = %e,
                "Submission retry abandoned on cancellation"
            );
            return Err(Error::Cancelled { job_id: None });
        }
        Err(e) => return Err(e),
    };

    tracing::debug!(request_id = %request_id, job_id = %handle.id, "Polling job");
    ctx.emit(Event::Submitted {
        id: request_id.clone(),
        job_id: handle.id.clone(),
    });

    let report = match ctx.poller.poll(&handle, &ctx.credential, &ctx.cancel).await {
        Ok(report) => report,
        Err(PollError::Cancelled { attempts }) => {
            tracing::info!(
                request_id = %request_id,
                job_id = %handle.id,
                attempts = attempts,
                "Polling abandoned on cancellation"
            );
            if ctx.cancel_remote_on_abort {
                cancel_remote(ctx, &handle).await;
            }
            return Err(Error::Cancelled {
                job_id: Some(handle.id),
            });
        }
        Err(PollError::Timeout { attempts }) => {
            return Err(Error::PollTimeout {
                job_id: handle.id,
                attempts,
            });
        }
    };

    for warning in &report.warnings {
        ctx.emit(Event::StatusUnrecognized {
            id: request_id.clone(),
            job_id: handle.id.clone(),
            status: warning.status.clone(),
        });
    }

    let outputs = match report.status {
        JobStatus::Succeeded { outputs } => outputs,
        JobStatus::Failed { reason } => {
            return Err(Error::RemoteJobFailure {
                job_id: handle.id,
                reason,
            });
        }
        JobStatus::Pending | JobStatus::Running => {
            return Err(Error::Other(format!(
                "poll for job {} ended on a non-terminal status",
                handle.id
            )));
        }
    };

    tracing::info!(
        request_id = %request_id,
        job_id = %handle.id,
        outputs = outputs.len(),
        attempts = report.attempts,
        "Job succeeded"
    );
    ctx.emit(Event::JobSucceeded {
        id: request_id.clone(),
        job_id: handle.id.clone(),
        outputs: outputs.len(),
        attempts: report.attempts,
    });

    let artifacts = ctx.fetcher.fetch(&outputs).await?;

    let mut stored = Vec::with_capacity(artifacts.len());
    for (i, artifact) in artifacts.into_iter().enumerate() {
        let item = ctx.sink.store(&ctx.request, i + 1, artifact).await?;
        ctx.emit(Event::Stored {
            id: request_id.clone(),
            source: item.source().to_string(),
            path: item.path().cloned(),
            size: item.size(),
        });
        stored.push(item);
    }

    if stored.is_empty() {
        tracing::warn!(
            request_id = %request_id,
            job_id = %handle.id,
            "Job succeeded without outputs"
        );
    }

    Ok(Outcome::Completed {
        job_id: handle.id,
        artifacts: stored,
    })
}

/// Best-effort remote cancellation of an abandoned job
async fn cancel_remote(ctx: &PipelineContext, handle: &JobHandle) {
    match ctx.service.cancel(handle, &ctx.credential).await {
        Ok(()) => tracing::info!(job_id = %handle.id, "Remote job cancelled"),
        Err(e) => tracing::warn!(
            job_id = %handle.id,
            error = %e,
            "Failed to cancel remote job"
        ),
    }
}
