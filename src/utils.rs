//! Utility functions for artifact file naming and path collision handling

use crate::config::FileCollisionAction;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Stem used when a request id has no usable characters
const FALLBACK_STEM: &str = "request";

/// Create a new file at `path`, handling collisions according to the specified action
///
/// The existence check and the creation are one step (`O_CREAT | O_EXCL`), so two
/// writers racing for the same name never end up sharing a file.
///
/// # Arguments
///
/// * `path` - The desired file path
/// * `action` - How to handle file collisions
///
/// # Returns
///
/// Returns the opened file and its final path. For Rename action, the path may have
/// a ` (n)` suffix added. For Skip action, returns an error if the file already exists.
/// For Overwrite action, an existing file is truncated.
///
/// # Examples
///
/// ```no_run
/// use replicate_dl::utils::create_unique_file;
/// use replicate_dl::config::FileCollisionAction;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), replicate_dl::error::StoreError> {
/// let path = Path::new("generated_assets/icon_1.png");
/// let (_file, created) = create_unique_file(path, FileCollisionAction::Rename).await?;
/// println!("writing to {}", created.display());
/// # Ok(())
/// # }
/// ```
pub async fn create_unique_file(
    path: &Path,
    action: FileCollisionAction,
) -> std::result::Result<(File, PathBuf), StoreError> {
    match action {
        FileCollisionAction::Overwrite => {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .await
                .map_err(|e| open_error(path, e))?;
            Ok((file, path.to_path_buf()))
        }
        FileCollisionAction::Skip => match create_new(path).await {
            Ok(file) => Ok((file, path.to_path_buf())),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(StoreError {
                path: Some(path.to_path_buf()),
                reason: "file already exists and collision action is skip".to_string(),
            }),
            Err(e) => Err(open_error(path, e)),
        },
        FileCollisionAction::Rename => {
            match create_new(path).await {
                Ok(file) => return Ok((file, path.to_path_buf())),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(open_error(path, e)),
            }

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| StoreError {
                    path: Some(path.to_path_buf()),
                    reason: "cannot extract file stem".to_string(),
                })?;

            let extension = path.extension().and_then(|e| e.to_str());

            let parent = path.parent().ok_or_else(|| StoreError {
                path: Some(path.to_path_buf()),
                reason: "cannot extract parent directory".to_string(),
            })?;

            // Try adding (1), (2), (3), ... until a name is free
            for i in 1..=MAX_RENAME_ATTEMPTS {
                let new_name = match extension {
                    Some(ext) => format!("{} ({}).{}", stem, i, ext),
                    None => format!("{} ({})", stem, i),
                };
                let new_path = parent.join(new_name);
                match create_new(&new_path).await {
                    Ok(file) => return Ok((file, new_path)),
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                    Err(e) => return Err(open_error(&new_path, e)),
                }
            }

            Err(StoreError {
                path: Some(path.to_path_buf()),
                reason: format!(
                    "could not find a unique name after {} attempts",
                    MAX_RENAME_ATTEMPTS
                ),
            })
        }
    }
}

async fn create_new(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
}

fn open_error(path: &Path, e: std::io::Error) -> StoreError {
    StoreError {
        path: Some(path.to_path_buf()),
        reason: format!("failed to create file: {}", e),
    }
}

/// Reduce a request id to characters that are safe in a file name
///
/// ASCII letters, digits, `-` and `_` are kept; everything else becomes `_`.
/// An id with nothing left falls back to `"request"`.
pub fn sanitize_file_stem(id: &str) -> String {
    let sanitized: String = id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.trim_matches('_').is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        sanitized
    }
}

/// Build the file name for the `index`-th (1-based) artifact of a request
///
/// Format: `{sanitized id}_{YYYYmmdd_HHMMSS}_{index}.{extension}`
pub fn artifact_file_name(
    request_id: &str,
    at: DateTime<Utc>,
    index: usize,
    extension: &str,
) -> String {
    format!(
        "{}_{}_{}.{}",
        sanitize_file_stem(request_id),
        at.format("%Y%m%d_%H%M%S"),
        index,
        extension
    )
}
