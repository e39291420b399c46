//! Artifact retrieval for succeeded jobs
//!
//! Outputs are fetched in the order the service listed them. The first failure
//! aborts the whole set; partial sets are never returned.

use crate::error::{FetchError, TransportError};
use crate::service::ArtifactSource;
use crate::types::Artifact;
use std::sync::Arc;

/// Retrieves the payloads behind a job's result locations
#[derive(Clone)]
pub struct ArtifactFetcher {
    source: Arc<dyn ArtifactSource>,
}

impl ArtifactFetcher {
    /// Create a fetcher over any artifact source
    pub fn new(source: Arc<dyn ArtifactSource>) -> Self {
        Self { source }
    }

    /// Fetch every URI, fail-fast
    ///
    /// Unparsable URIs, transport failures and non-2xx replies all stop the
    /// set with a [`FetchError`] naming the offending location. Payloads are
    /// not decoded or validated.
    pub async fn fetch(&self, uris: &[String]) -> Result<Vec<Artifact>, FetchError> {
        let mut artifacts = Vec::with_capacity(uris.len());

        for raw in uris {
            let uri = url::Url::parse(raw).map_err(|e| FetchError {
                uri: raw.clone(),
                cause: TransportError::InvalidUri {
                    uri: raw.clone(),
                    reason: e.to_string(),
                },
            })?;

            let bytes = self.source.download(&uri).await.map_err(|cause| {
                tracing::warn!(uri = %raw, error = %cause, "Artifact download failed");
                FetchError {
                    uri: raw.clone(),
                    cause,
                }
            })?;

            tracing::debug!(uri = %raw, size = bytes.len(), "Artifact downloaded");
            artifacts.push(Artifact {
                source: raw.clone(),
                bytes,
            });
        }

        Ok(artifacts)
    }
}

impl std::fmt::Debug for ArtifactFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactFetcher").finish_non_exhaustive()
    }
}
