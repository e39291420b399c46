//! Seams between the orchestration logic and the remote service.
//!
//! [`JobClient`](crate::client::JobClient) implements both traits over HTTP; tests
//! substitute in-process fakes.

use crate::config::Credential;
use crate::error::{Result, TransportError};
use crate::types::{GenerationRequest, JobHandle, StatusReading};

/// Remote asynchronous job service
#[async_trait::async_trait]
pub trait JobService: Send + Sync {
    /// Submit one request, single attempt
    ///
    /// Fails with [`Error::Submission`](crate::Error::Submission) when the service
    /// rejects the request and [`Error::Transport`](crate::Error::Transport) when it
    /// could not be reached.
    async fn submit(&self, request: &GenerationRequest, credential: &Credential)
    -> Result<JobHandle>;

    /// Query the current status of a job
    async fn status(
        &self,
        handle: &JobHandle,
        credential: &Credential,
    ) -> std::result::Result<StatusReading, TransportError>;

    /// Ask the service to stop a job
    async fn cancel(&self, handle: &JobHandle, credential: &Credential) -> Result<()>;
}

/// Source of artifact bytes
#[async_trait::async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Retrieve the payload at `uri`
    async fn download(&self, uri: &url::Url) -> std::result::Result<Vec<u8>, TransportError>;
}
