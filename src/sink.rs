//! Destinations that take ownership of retrieved artifacts

use crate::config::{FileCollisionAction, OutputConfig};
use crate::error::StoreError;
use crate::types::{Artifact, GenerationRequest, StoredArtifact};
use crate::utils::{artifact_file_name, create_unique_file};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Consumer of artifacts produced by a succeeded job
#[async_trait::async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Take ownership of the `index`-th (1-based) artifact of `request`
    async fn store(
        &self,
        request: &GenerationRequest,
        index: usize,
        artifact: Artifact,
    ) -> Result<StoredArtifact, StoreError>;
}

/// Writes each artifact to its own file under a directory
///
/// Files are named `{id}_{YYYYmmdd_HHMMSS}_{n}.{ext}`, with the extension taken
/// from the request's output format. The directory is created on first use.
/// Each store claims its file name atomically, so concurrent pipelines whose ids
/// reduce to the same stem get distinct files.
#[derive(Clone, Debug)]
pub struct FileSink {
    dir: PathBuf,
    collision: FileCollisionAction,
}

impl FileSink {
    /// Create a sink writing under `dir`
    pub fn new(dir: impl Into<PathBuf>, collision: FileCollisionAction) -> Self {
        Self {
            dir: dir.into(),
            collision,
        }
    }

    /// Create a sink from output settings
    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(config.output_dir.clone(), config.file_collision)
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait::async_trait]
impl ArtifactSink for FileSink {
    async fn store(
        &self,
        request: &GenerationRequest,
        index: usize,
        artifact: Artifact,
    ) -> Result<StoredArtifact, StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError {
                path: Some(self.dir.clone()),
                reason: format!("failed to create output directory: {}", e),
            })?;

        let name = artifact_file_name(
            request.id().as_str(),
            Utc::now(),
            index,
            request.output_format().extension(),
        );
        let (mut file, path) = create_unique_file(&self.dir.join(name), self.collision).await?;

        let written = async {
            file.write_all(&artifact.bytes).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            drop(file);
            // Partial file under a name only this store claimed
            tokio::fs::remove_file(&path).await.ok();
            return Err(StoreError {
                path: Some(path),
                reason: e.to_string(),
            });
        }

        tracing::debug!(
            request_id = %request.id(),
            path = %path.display(),
            size = artifact.len(),
            "Artifact written"
        );

        Ok(StoredArtifact::File {
            source: artifact.source,
            size: artifact.bytes.len() as u64,
            path,
        })
    }
}

/// Keeps artifacts in memory and hands them back in the outcome
#[derive(Clone, Copy, Debug, Default)]
pub struct MemorySink;

#[async_trait::async_trait]
impl ArtifactSink for MemorySink {
    async fn store(
        &self,
        _request: &GenerationRequest,
        _index: usize,
        artifact: Artifact,
    ) -> Result<StoredArtifact, StoreError> {
        Ok(StoredArtifact::Memory(artifact))
    }
}
