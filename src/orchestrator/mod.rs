//! Batch orchestration: runs many request pipelines under a concurrency cap.
//!
//! Each request runs as its own task (submit → poll → fetch → store). Admission
//! is gated by a semaphore and paced by a [`Pacer`]; outcomes flow back to the
//! admission loop over a channel and are keyed by request id. A failing request
//! never affects its siblings.

mod pipeline;

use crate::client::JobClient;
use crate::config::{BatchConfig, Config, Credential, PollConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::fetcher::ArtifactFetcher;
use crate::pacing::Pacer;
use crate::poller::StatusPoller;
use crate::service::{ArtifactSource, JobService};
use crate::sink::{ArtifactSink, FileSink};
use crate::types::{BatchResult, Event, GenerationRequest, Outcome, RequestId};
use pipeline::{PipelineContext, run_pipeline};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Runs batches of generation requests against a job service
///
/// # Example
///
/// ```no_run
/// use replicate_dl::{BatchOrchestrator, Config, Credential, GenerationRequest};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let orchestrator = BatchOrchestrator::new(config.clone(), Credential::from_env()?)?;
///
///     let requests = vec![
///         GenerationRequest::new("icon-chart", "flat chart icon, blue"),
///         GenerationRequest::new("icon-gear", "flat gear icon, grey"),
///     ];
///     let result = orchestrator
///         .run_batch(requests, &config.batch, CancellationToken::new())
///         .await?;
///
///     for (id, error) in result.failures() {
///         eprintln!("{id}: {error}");
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct BatchOrchestrator {
    service: Arc<dyn JobService>,
    fetcher: ArtifactFetcher,
    sink: Arc<dyn ArtifactSink>,
    credential: Credential,
    polling: PollConfig,
    submit_retry: RetryConfig,
    event_tx: broadcast::Sender<Event>,
}

impl BatchOrchestrator {
    /// Build an orchestrator talking to the service over HTTP and writing files
    ///
    /// Validates the configuration first.
    pub fn new(config: Config, credential: Credential) -> Result<Self> {
        config.validate()?;
        let client = Arc::new(JobClient::new(&config.api)?);
        let sink = Arc::new(FileSink::from_config(&config.output));
        Ok(Self::with_parts(
            client.clone(),
            client,
            sink,
            credential,
            &config,
        ))
    }

    /// Build an orchestrator from arbitrary service, source and sink implementations
    pub fn with_parts(
        service: Arc<dyn JobService>,
        source: Arc<dyn ArtifactSource>,
        sink: Arc<dyn ArtifactSink>,
        credential: Credential,
        config: &Config,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            service,
            fetcher: ArtifactFetcher::new(source),
            sink,
            credential,
            polling: config.polling.clone(),
            submit_retry: config.submit_retry.clone(),
            event_tx,
        }
    }

    /// Subscribe to pipeline events
    ///
    /// Receivers that fall more than 1000 events behind miss the oldest ones.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    fn emit_event(&self, event: Event) {
        // No receivers is fine
        self.event_tx.send(event).ok();
    }

    /// Run every request to an outcome
    ///
    /// Returns one [`Outcome`] per request, keyed by request id. Individual
    /// pipeline failures are recorded in the result; the only error returned is
    /// [`Error::Config`] for duplicate request ids, detected before anything is
    /// submitted.
    ///
    /// Once `cancel` fires, no further request is admitted and in-flight polls
    /// stop; the affected requests are recorded as [`Error::Cancelled`].
    pub async fn run_batch(
        &self,
        requests: Vec<GenerationRequest>,
        batch: &BatchConfig,
        cancel: CancellationToken,
    ) -> Result<BatchResult> {
        let ids = unique_request_ids(&requests)?;
        let total = requests.len();
        let limit = batch.concurrency_limit.max(1);

        tracing::info!(
            requests = total,
            concurrency_limit = limit,
            pacing_ms = batch.pacing_delay.as_millis(),
            "Starting batch"
        );

        let semaphore = Arc::new(Semaphore::new(limit));
        let mut pacer = Pacer::new(batch.pacing_delay);
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<(RequestId, Outcome)>(total.max(1));
        let poller = StatusPoller::new(self.service.clone(), self.polling.clone());
        let mut result = BatchResult::default();
        let mut tasks = Vec::with_capacity(total);

        for request in requests {
            let id = request.id().clone();

            if cancel.is_cancelled() {
                self.record_failure(&mut result, id, Error::Cancelled { job_id: None });
                continue;
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.record_failure(&mut result, id, Error::Cancelled { job_id: None });
                    continue;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => {
                        self.record_failure(
                            &mut result,
                            id,
                            Error::Other("admission semaphore closed".to_string()),
                        );
                        continue;
                    }
                },
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    drop(permit);
                    self.record_failure(&mut result, id, Error::Cancelled { job_id: None });
                    continue;
                }
                _ = pacer.ready() => {}
            }

            tracing::debug!(request_id = %id, "Admitting request");

            let ctx = PipelineContext {
                request,
                service: self.service.clone(),
                poller: poller.clone(),
                fetcher: self.fetcher.clone(),
                sink: self.sink.clone(),
                credential: self.credential.clone(),
                submit_retry: self.submit_retry.clone(),
                cancel_remote_on_abort: batch.cancel_remote_on_abort,
                event_tx: self.event_tx.clone(),
                cancel: cancel.clone(),
            };
            let tx = outcome_tx.clone();
            let task_id = id.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let outcome = run_pipeline(ctx).await;
                // Receiver outlives every task
                tx.send((task_id, outcome)).await.ok();
            });
            tasks.push((id, handle));
        }

        drop(outcome_tx);
        while let Some((id, outcome)) = outcome_rx.recv().await {
            if !result.record(id.clone(), outcome) {
                tracing::warn!(request_id = %id, "Ignoring second outcome for request");
            }
        }

        for (id, handle) in tasks {
            if let Err(e) = handle.await
                && e.is_panic()
            {
                tracing::error!(request_id = %id, "Pipeline task panicked");
            }
        }

        // Tasks that died without reporting still get an outcome
        for id in ids {
            if !result.contains(&id) {
                self.record_failure(
                    &mut result,
                    id,
                    Error::Other("pipeline task ended without reporting an outcome".to_string()),
                );
            }
        }

        let (succeeded, failed) = (result.succeeded(), result.failed());
        tracing::info!(succeeded, failed, "Batch complete");
        self.emit_event(Event::BatchComplete { succeeded, failed });

        Ok(result)
    }

    fn record_failure(&self, result: &mut BatchResult, id: RequestId, error: Error) {
        self.emit_event(Event::PipelineFailed {
            id: id.clone(),
            code: error.code().to_string(),
            error: error.to_string(),
        });
        result.record(id, Outcome::Failed(error));
    }
}

/// Collect request ids, rejecting duplicates
fn unique_request_ids(requests: &[GenerationRequest]) -> Result<Vec<RequestId>> {
    let mut seen = HashSet::with_capacity(requests.len());
    let mut ids = Vec::with_capacity(requests.len());
    for request in requests {
        if !seen.insert(request.id()) {
            return Err(Error::config(
                "requests",
                format!("duplicate request id '{}'", request.id()),
            ));
        }
        ids.push(request.id().clone());
    }
    Ok(ids)
}
