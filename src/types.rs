//! Core types for replicate-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::Error;

/// Model version used when a request does not name one (FLUX Schnell)
pub const DEFAULT_MODEL_VERSION: &str =
    "ac732df83cea7fff18b8472768c88ad041fa750ff7682a21affe81863cbe77e4";

/// Caller-chosen identifier for a request within a batch
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Create a new RequestId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Image container format requested from the model
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG (default)
    #[default]
    Png,
    /// JPEG
    Jpg,
    /// WebP
    Webp,
}

impl OutputFormat {
    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpg => "jpg",
            OutputFormat::Webp => "webp",
        }
    }
}

/// One asset-generation request
///
/// Immutable once built: the builder methods consume and return the value.
///
/// ```
/// use replicate_dl::{GenerationRequest, OutputFormat};
///
/// let request = GenerationRequest::new("icon_chart_modern", "modern financial chart icon")
///     .with_size(256, 256)
///     .with_output_format(OutputFormat::Webp);
/// assert_eq!(request.width(), 256);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    id: RequestId,
    version: String,
    prompt: String,
    width: u32,
    height: u32,
    num_outputs: u32,
    output_format: OutputFormat,
    guidance_scale: f64,
    num_inference_steps: u32,
}

impl GenerationRequest {
    /// Create a request with the default model and sampling parameters
    ///
    /// Defaults: 1024×1024, one png output, guidance 3.5, 4 inference steps.
    pub fn new(id: impl Into<RequestId>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: DEFAULT_MODEL_VERSION.to_string(),
            prompt: prompt.into(),
            width: 1024,
            height: 1024,
            num_outputs: 1,
            output_format: OutputFormat::Png,
            guidance_scale: 3.5,
            num_inference_steps: 4,
        }
    }

    /// Use a different model version
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set target dimensions
    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the number of images to generate
    #[must_use]
    pub fn with_num_outputs(mut self, num_outputs: u32) -> Self {
        self.num_outputs = num_outputs;
        self
    }

    /// Set the output container format
    #[must_use]
    pub fn with_output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = output_format;
        self
    }

    /// Set guidance scale and inference step count
    #[must_use]
    pub fn with_sampling(mut self, guidance_scale: f64, num_inference_steps: u32) -> Self {
        self.guidance_scale = guidance_scale;
        self.num_inference_steps = num_inference_steps;
        self
    }

    /// Request identifier
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Model version identifier
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Prompt text
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Target width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Target height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of outputs requested
    pub fn num_outputs(&self) -> u32 {
        self.num_outputs
    }

    /// Output container format
    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    /// Guidance scale
    pub fn guidance_scale(&self) -> f64 {
        self.guidance_scale
    }

    /// Inference step count
    pub fn num_inference_steps(&self) -> u32 {
        self.num_inference_steps
    }
}

/// Handle to a submitted remote job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Opaque job identifier assigned by the service
    pub id: String,
    /// When the submission was accepted
    pub submitted_at: DateTime<Utc>,
}

impl JobHandle {
    /// Create a handle stamped with the current time
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// State of a remote job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted, not started
    Pending,
    /// Running (also used for statuses this client does not recognize)
    Running,
    /// Finished; `outputs` are the result locations as reported
    Succeeded {
        /// Result URIs
        outputs: Vec<String>,
    },
    /// Finished with a service-reported failure
    Failed {
        /// Failure reason as reported
        reason: String,
    },
}

impl JobStatus {
    /// Whether no further transitions can occur
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded { .. } | JobStatus::Failed { .. })
    }
}

/// Result of one status query, mapped at the service boundary
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusReading {
    /// Mapped status
    pub status: JobStatus,
    /// Status string as sent by the service
    pub raw: String,
    /// False when `raw` was not one of the known statuses
    pub recognized: bool,
}

impl StatusReading {
    /// Reading for a known status
    pub fn known(status: JobStatus, raw: impl Into<String>) -> Self {
        Self {
            status,
            raw: raw.into(),
            recognized: true,
        }
    }
}

/// Bytes retrieved for one output of a succeeded job
#[derive(Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Location the bytes were fetched from
    pub source: String,
    /// Raw payload, not decoded or validated
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact")
            .field("source", &self.source)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// An artifact after its sink took ownership
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoredArtifact {
    /// Written to disk
    File {
        /// Location the bytes were fetched from
        source: String,
        /// Where the bytes were written
        path: PathBuf,
        /// Bytes written
        size: u64,
    },
    /// Kept in memory
    Memory(Artifact),
}

impl StoredArtifact {
    /// Location the bytes were fetched from
    pub fn source(&self) -> &str {
        match self {
            StoredArtifact::File { source, .. } => source,
            StoredArtifact::Memory(artifact) => &artifact.source,
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> u64 {
        match self {
            StoredArtifact::File { size, .. } => *size,
            StoredArtifact::Memory(artifact) => artifact.len() as u64,
        }
    }

    /// File path, for artifacts written to disk
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            StoredArtifact::File { path, .. } => Some(path),
            StoredArtifact::Memory(_) => None,
        }
    }
}

/// Final result of one request's pipeline
#[derive(Debug)]
pub enum Outcome {
    /// Job succeeded and every output was stored (possibly none)
    Completed {
        /// Remote job identifier
        job_id: String,
        /// Stored outputs, in the order the service listed them
        artifacts: Vec<StoredArtifact>,
    },
    /// Pipeline ended with an error
    Failed(Error),
}

impl Outcome {
    /// Whether the pipeline completed
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }

    /// Whether the job succeeded but produced no outputs
    pub fn is_empty_success(&self) -> bool {
        matches!(self, Outcome::Completed { artifacts, .. } if artifacts.is_empty())
    }

    /// Stored artifacts, if completed
    pub fn artifacts(&self) -> Option<&[StoredArtifact]> {
        match self {
            Outcome::Completed { artifacts, .. } => Some(artifacts),
            Outcome::Failed(_) => None,
        }
    }

    /// The error, if failed
    pub fn error(&self) -> Option<&Error> {
        match self {
            Outcome::Completed { .. } => None,
            Outcome::Failed(e) => Some(e),
        }
    }
}

/// Outcomes of a batch, keyed by request id
///
/// Every request handed to the batch has exactly one entry, regardless of
/// the order in which pipelines finished.
#[derive(Debug, Default)]
pub struct BatchResult {
    outcomes: HashMap<RequestId, Outcome>,
}

impl BatchResult {
    /// Record an outcome; the first outcome for a request wins
    pub(crate) fn record(&mut self, id: RequestId, outcome: Outcome) -> bool {
        if self.outcomes.contains_key(&id) {
            return false;
        }
        self.outcomes.insert(id, outcome);
        true
    }

    /// Whether an outcome exists for this request
    pub fn contains(&self, id: &RequestId) -> bool {
        self.outcomes.contains_key(id)
    }

    /// Outcome for a request
    pub fn get(&self, id: &RequestId) -> Option<&Outcome> {
        self.outcomes.get(id)
    }

    /// Number of outcomes
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the batch was empty
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of completed pipelines
    pub fn succeeded(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }

    /// Number of failed pipelines
    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    /// Iterate over all outcomes
    pub fn iter(&self) -> impl Iterator<Item = (&RequestId, &Outcome)> {
        self.outcomes.iter()
    }

    /// Failed requests with their errors
    pub fn failures(&self) -> impl Iterator<Item = (&RequestId, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|(id, outcome)| outcome.error().map(|e| (id, e)))
    }

    /// Consume into the underlying map
    pub fn into_inner(self) -> HashMap<RequestId, Outcome> {
        self.outcomes
    }
}

/// Event emitted by the orchestrator
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job accepted by the service
    Submitted {
        /// Request identifier
        id: RequestId,
        /// Remote job identifier
        job_id: String,
    },

    /// Service sent a status this client does not know; treated as running
    StatusUnrecognized {
        /// Request identifier
        id: RequestId,
        /// Remote job identifier
        job_id: String,
        /// Status string as sent
        status: String,
    },

    /// Job reached `Succeeded`
    JobSucceeded {
        /// Request identifier
        id: RequestId,
        /// Remote job identifier
        job_id: String,
        /// Number of result locations
        outputs: usize,
        /// Status queries issued
        attempts: u32,
    },

    /// An artifact was handed to the sink
    Stored {
        /// Request identifier
        id: RequestId,
        /// Location the bytes were fetched from
        source: String,
        /// Destination path, for file sinks
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
        /// Bytes stored
        size: u64,
    },

    /// Pipeline ended with an error
    PipelineFailed {
        /// Request identifier
        id: RequestId,
        /// Machine-readable error code
        code: String,
        /// Error message
        error: String,
    },

    /// Every request has an outcome
    BatchComplete {
        /// Completed pipelines
        succeeded: usize,
        /// Failed pipelines
        failed: usize,
    },
}
