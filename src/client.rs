//! HTTP client for the prediction service.
//!
//! Wraps the three job endpoints (create, get, cancel) and plain artifact
//! downloads using [`reqwest`]. Raw status strings are mapped into
//! [`JobStatus`] here and nowhere else.

use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{ApiConfig, Credential};
use crate::error::{Error, Result, SubmissionError, TransportError};
use crate::service::{ArtifactSource, JobService};
use crate::types::{GenerationRequest, JobHandle, JobStatus, OutputFormat, StatusReading};

/// Reason recorded when the service reports failure without an error message
const UNKNOWN_ERROR: &str = "Unknown error";

/// HTTP client for one prediction service endpoint
#[derive(Clone)]
pub struct JobClient {
    client: reqwest::Client,
    base_url: String,
}

/// Body of `POST /predictions`
#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    version: &'a str,
    input: PredictionInput<'a>,
}

#[derive(Debug, Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
    num_outputs: u32,
    output_format: OutputFormat,
    guidance_scale: f64,
    num_inference_steps: u32,
}

impl<'a> From<&'a GenerationRequest> for PredictionRequest<'a> {
    fn from(request: &'a GenerationRequest) -> Self {
        Self {
            version: request.version(),
            input: PredictionInput {
                prompt: request.prompt(),
                width: request.width(),
                height: request.height(),
                num_outputs: request.num_outputs(),
                output_format: request.output_format(),
                guidance_scale: request.guidance_scale(),
                num_inference_steps: request.num_inference_steps(),
            },
        }
    }
}

/// Response of `POST /predictions`
#[derive(Debug, Deserialize)]
struct CreatedPrediction {
    id: String,
}

/// Response of `GET /predictions/{id}`
///
/// `output` is a single URI, a list of URIs, or null depending on the model;
/// `error` is usually a string but not guaranteed to be one.
#[derive(Debug, Deserialize)]
struct PredictionState {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl PredictionState {
    fn outputs(&self) -> Vec<String> {
        match &self.output {
            Some(serde_json::Value::String(uri)) => vec![uri.clone()],
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn failure_reason(&self) -> String {
        match &self.error {
            Some(serde_json::Value::String(reason)) if !reason.is_empty() => reason.clone(),
            Some(serde_json::Value::Null) | None => UNKNOWN_ERROR.to_string(),
            Some(other) => other.to_string(),
        }
    }

    /// Map the service's status string into the closed [`JobStatus`] set
    fn into_reading(self) -> StatusReading {
        let raw = self.status.clone().unwrap_or_default();
        let status = match raw.as_str() {
            "starting" => JobStatus::Pending,
            "processing" => JobStatus::Running,
            "succeeded" => JobStatus::Succeeded {
                outputs: self.outputs(),
            },
            "failed" => JobStatus::Failed {
                reason: self.failure_reason(),
            },
            "canceled" => JobStatus::Failed {
                reason: "prediction was canceled".to_string(),
            },
            _ => {
                return StatusReading {
                    status: JobStatus::Running,
                    raw,
                    recognized: false,
                };
            }
        };
        StatusReading::known(status, raw)
    }
}

impl JobClient {
    /// Create a client for the configured endpoint
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(api.request_timeout)
            .connect_timeout(api.connect_timeout)
            .user_agent(concat!("replicate-dl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TransportError::from)?;

        Ok(Self::with_client(client, api.base_url.clone()))
    }

    /// Create a client reusing an existing [`reqwest::Client`]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/predictions/{segments...}`, each segment percent-encoded
    ///
    /// Job ids come from the service; encoding keeps one that contains `/`, `?`
    /// or `..` inside its own path segment.
    fn predictions_url(&self, segments: &[&str]) -> std::result::Result<Url, TransportError> {
        let invalid = |reason: String| TransportError::InvalidUri {
            uri: self.base_url.clone(),
            reason,
        };
        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .push("predictions")
            .extend(segments);
        Ok(url)
    }

    /// Read the body of a non-2xx response for diagnostics
    async fn error_body(response: reqwest::Response) -> String {
        response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string())
    }

    /// Ensure the response has a success status code.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> std::result::Result<reqwest::Response, TransportError> {
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: Self::error_body(response).await,
            });
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl JobService for JobClient {
    async fn submit(
        &self,
        request: &GenerationRequest,
        credential: &Credential,
    ) -> Result<JobHandle> {
        let body = PredictionRequest::from(request);

        let response = self
            .client
            .post(self.predictions_url(&[])?)
            .header(AUTHORIZATION, credential.bearer())
            .json(&body)
            .send()
            .await
            .map_err(TransportError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = Self::error_body(response).await;
            tracing::warn!(
                request_id = %request.id(),
                status = status.as_u16(),
                body = %body,
                "Submission rejected"
            );
            return Err(Error::Submission(SubmissionError {
                status: status.as_u16(),
                body,
            }));
        }

        let created: CreatedPrediction = response.json().await.map_err(|e| {
            TransportError::Decode(format!("submission response without job id: {}", e))
        })?;

        tracing::info!(request_id = %request.id(), job_id = %created.id, "Job submitted");
        Ok(JobHandle::new(created.id))
    }

    async fn status(
        &self,
        handle: &JobHandle,
        credential: &Credential,
    ) -> std::result::Result<StatusReading, TransportError> {
        let response = self
            .client
            .get(self.predictions_url(&[handle.id.as_str()])?)
            .header(AUTHORIZATION, credential.bearer())
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;

        let state: PredictionState = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(format!("status response: {}", e)))?;

        Ok(state.into_reading())
    }

    async fn cancel(&self, handle: &JobHandle, credential: &Credential) -> Result<()> {
        let response = self
            .client
            .post(self.predictions_url(&[handle.id.as_str(), "cancel"])?)
            .header(AUTHORIZATION, credential.bearer())
            .send()
            .await
            .map_err(TransportError::from)?;
        Self::ensure_success(response).await?;

        tracing::info!(job_id = %handle.id, "Remote cancellation requested");
        Ok(())
    }
}

#[async_trait::async_trait]
impl ArtifactSource for JobClient {
    async fn download(&self, uri: &url::Url) -> std::result::Result<Vec<u8>, TransportError> {
        let response = self.client.get(uri.clone()).send().await?;
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
