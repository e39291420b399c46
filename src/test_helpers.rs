//! Shared in-process fakes for the job service and artifact source.

use crate::config::Credential;
use crate::error::{Result, SubmissionError, TransportError};
use crate::service::{ArtifactSource, JobService};
use crate::types::{GenerationRequest, JobHandle, JobStatus, RequestId, StatusReading};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

/// One scripted reply to a status query
#[derive(Clone, Debug)]
pub(crate) enum Step {
    Reading(StatusReading),
    /// Non-2xx reply to the status query
    Blip(u16),
}

pub(crate) fn pending() -> Step {
    Step::Reading(StatusReading::known(JobStatus::Pending, "starting"))
}

pub(crate) fn running() -> Step {
    Step::Reading(StatusReading::known(JobStatus::Running, "processing"))
}

pub(crate) fn succeeded(outputs: &[&str]) -> Step {
    Step::Reading(StatusReading::known(
        JobStatus::Succeeded {
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        },
        "succeeded",
    ))
}

pub(crate) fn failed(reason: &str) -> Step {
    Step::Reading(StatusReading::known(
        JobStatus::Failed {
            reason: reason.to_string(),
        },
        "failed",
    ))
}

pub(crate) fn unknown(raw: &str) -> Step {
    Step::Reading(StatusReading {
        status: JobStatus::Running,
        raw: raw.to_string(),
        recognized: false,
    })
}

pub(crate) fn blip() -> Step {
    Step::Blip(503)
}

enum Plan {
    Accept(VecDeque<Step>),
    Reject(SubmissionError),
    /// Every submit fails with this transport status
    Unavailable(u16),
}

/// Scripted job service
///
/// Each request id maps to either a rejection or a status script. The last step
/// of a script repeats forever. Job ids are `job-{request id}`.
pub(crate) struct MockJobService {
    plans: Mutex<HashMap<String, Plan>>,
    status_latency: Duration,
    submits: AtomicU32,
    status_calls: Mutex<HashMap<String, u32>>,
    cancels: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockJobService {
    pub(crate) fn new() -> Self {
        Self {
            plans: Mutex::new(HashMap::new()),
            status_latency: Duration::ZERO,
            submits: AtomicU32::new(0),
            status_calls: Mutex::new(HashMap::new()),
            cancels: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Delay every status reply by `latency`
    pub(crate) fn with_status_latency(mut self, latency: Duration) -> Self {
        self.status_latency = latency;
        self
    }

    /// Accept `request_id` and answer status queries from `steps`
    pub(crate) fn job(self, request_id: &str, steps: Vec<Step>) -> Self {
        self.plans
            .lock()
            .unwrap()
            .insert(request_id.to_string(), Plan::Accept(steps.into()));
        self
    }

    /// Reject `request_id` at submission
    pub(crate) fn reject(self, request_id: &str, status: u16, body: &str) -> Self {
        self.plans.lock().unwrap().insert(
            request_id.to_string(),
            Plan::Reject(SubmissionError {
                status,
                body: body.to_string(),
            }),
        );
        self
    }

    /// Fail every submit of `request_id` with a transport-level `status`
    pub(crate) fn unavailable(self, request_id: &str, status: u16) -> Self {
        self.plans
            .lock()
            .unwrap()
            .insert(request_id.to_string(), Plan::Unavailable(status));
        self
    }

    pub(crate) fn job_id(request_id: &str) -> String {
        format!("job-{request_id}")
    }

    pub(crate) fn submit_count(&self) -> u32 {
        self.submits.load(Ordering::SeqCst)
    }

    pub(crate) fn status_count(&self, request_id: &str) -> u32 {
        self.status_calls
            .lock()
            .unwrap()
            .get(&Self::job_id(request_id))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn cancelled_jobs(&self) -> Vec<String> {
        self.cancels.lock().unwrap().clone()
    }

    /// Highest number of accepted jobs that were not yet terminal at the same time
    pub(crate) fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn next_step(&self, job_id: &str) -> Option<Step> {
        let request_id = job_id.strip_prefix("job-")?;
        let mut plans = self.plans.lock().unwrap();
        match plans.get_mut(request_id)? {
            Plan::Accept(steps) if steps.len() > 1 => steps.pop_front(),
            Plan::Accept(steps) => steps.front().cloned(),
            Plan::Reject(_) | Plan::Unavailable(_) => None,
        }
    }
}

#[async_trait::async_trait]
impl JobService for MockJobService {
    async fn submit(
        &self,
        request: &GenerationRequest,
        _credential: &Credential,
    ) -> Result<JobHandle> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        let id = request.id().as_str();
        match self.plans.lock().unwrap().get(id) {
            Some(Plan::Reject(e)) => return Err(e.clone().into()),
            Some(Plan::Unavailable(status)) => {
                return Err(TransportError::Status {
                    status: *status,
                    body: "service unavailable".to_string(),
                }
                .into());
            }
            Some(Plan::Accept(_)) => {}
            None => {
                return Err(SubmissionError {
                    status: 404,
                    body: format!("no plan for {id}"),
                }
                .into());
            }
        }
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        Ok(JobHandle::new(Self::job_id(id)))
    }

    async fn status(
        &self,
        handle: &JobHandle,
        _credential: &Credential,
    ) -> std::result::Result<StatusReading, TransportError> {
        *self
            .status_calls
            .lock()
            .unwrap()
            .entry(handle.id.clone())
            .or_default() += 1;

        if !self.status_latency.is_zero() {
            tokio::time::sleep(self.status_latency).await;
        }

        match self.next_step(&handle.id) {
            Some(Step::Reading(reading)) => {
                if reading.status.is_terminal() {
                    // Jobs polled without a submit never counted as active
                    self.active
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                        .ok();
                }
                Ok(reading)
            }
            Some(Step::Blip(status)) => Err(TransportError::Status {
                status,
                body: "service unavailable".to_string(),
            }),
            None => Err(TransportError::Status {
                status: 404,
                body: format!("unknown job {}", handle.id),
            }),
        }
    }

    async fn cancel(&self, handle: &JobHandle, _credential: &Credential) -> Result<()> {
        self.cancels.lock().unwrap().push(handle.id.clone());
        Ok(())
    }
}

/// Artifact source serving fixed payloads by URI
pub(crate) struct MockSource {
    payloads: HashMap<String, Vec<u8>>,
}

impl MockSource {
    pub(crate) fn new() -> Self {
        Self {
            payloads: HashMap::new(),
        }
    }

    pub(crate) fn serve(mut self, uri: &str, bytes: Vec<u8>) -> Self {
        self.payloads.insert(uri.to_string(), bytes);
        self
    }
}

#[async_trait::async_trait]
impl ArtifactSource for MockSource {
    async fn download(&self, uri: &url::Url) -> std::result::Result<Vec<u8>, TransportError> {
        self.payloads
            .get(uri.as_str())
            .cloned()
            .ok_or_else(|| TransportError::Status {
                status: 404,
                body: "not found".to_string(),
            })
    }
}

pub(crate) fn request(id: &str) -> GenerationRequest {
    GenerationRequest::new(RequestId::new(id), format!("prompt for {id}"))
}

pub(crate) fn credential() -> Credential {
    Credential::new("r8_test")
}
