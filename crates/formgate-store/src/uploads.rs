//! Staged-upload resolution.
//!
//! A file answer arrives as a token naming a previously staged upload.
//! Committing a submission moves each staged file into form-scoped
//! permanent storage; a rolled-back commit moves it back.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// A staged upload after resolution into permanent storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub token: String,
    /// Path relative to the storage root, `<form_id>/<token>`.
    pub reference: String,
    pub size: u64,
}

impl StoredFile {
    /// Where `token` lands for `form_id`, for a move whose outcome is unknown.
    pub fn pending(form_id: u64, token: &str) -> Self {
        Self {
            token: token.to_string(),
            reference: format!("{form_id}/{token}"),
            size: 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("no staged upload for token `{0}`")]
    NotFound(String),

    #[error("upload token `{0}` is malformed")]
    BadToken(String),

    #[error("upload `{token}`: {message}")]
    Io { token: String, message: String },

    #[error("upload `{token}` timed out after {timeout_ms} ms")]
    Timeout { token: String, timeout_ms: u64 },
}

impl UploadError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::Io { .. } | UploadError::Timeout { .. })
    }
}

/// Temporary-file resolution service keyed by upload token.
#[async_trait]
pub trait UploadResolver: Send + Sync {
    /// Move the staged upload `token` into storage for `form_id`.
    ///
    /// Must be idempotent: an attempt abandoned on timeout may still have
    /// completed, and the retry has to find the stored file.
    async fn resolve(&self, form_id: u64, token: &str) -> Result<StoredFile, UploadError>;

    /// Undo a resolution, returning the file to staging.
    async fn restore(&self, file: &StoredFile) -> Result<(), UploadError>;

    /// Remove a stored file for good (used when results are deleted).
    async fn remove(&self, reference: &str) -> Result<(), UploadError>;
}

/// Resolver over two local directories.
#[derive(Debug, Clone)]
pub struct DirectoryUploads {
    staging_dir: PathBuf,
    storage_dir: PathBuf,
}

impl DirectoryUploads {
    pub fn new(staging_dir: impl Into<PathBuf>, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            storage_dir: storage_dir.into(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }
}

fn check_token(token: &str) -> Result<(), UploadError> {
    let well_formed = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if well_formed {
        Ok(())
    } else {
        Err(UploadError::BadToken(token.to_string()))
    }
}

fn io_error(token: &str, err: std::io::Error) -> UploadError {
    UploadError::Io {
        token: token.to_string(),
        message: err.to_string(),
    }
}

/// Size of the file at `path`, or `None` if nothing is there.
async fn stored_size(token: &str, path: &Path) -> Result<Option<u64>, UploadError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Ok(Some(metadata.len())),
        Ok(_) => Ok(None),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_error(token, err)),
    }
}

#[async_trait]
impl UploadResolver for DirectoryUploads {
    async fn resolve(&self, form_id: u64, token: &str) -> Result<StoredFile, UploadError> {
        check_token(token)?;
        let source = self.staging_dir.join(token);
        let form_dir = self.storage_dir.join(form_id.to_string());
        let target = form_dir.join(token);
        let stored = |size| StoredFile {
            size,
            ..StoredFile::pending(form_id, token)
        };

        let Some(size) = stored_size(token, &source).await? else {
            // Already moved by an earlier attempt.
            return match stored_size(token, &target).await? {
                Some(size) => Ok(stored(size)),
                None => Err(UploadError::NotFound(token.to_string())),
            };
        };

        tokio::fs::create_dir_all(&form_dir)
            .await
            .map_err(|err| io_error(token, err))?;
        match tokio::fs::rename(&source, &target).await {
            Ok(()) => Ok(stored(size)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                match stored_size(token, &target).await? {
                    Some(size) => Ok(stored(size)),
                    None => Err(UploadError::NotFound(token.to_string())),
                }
            }
            Err(err) => Err(io_error(token, err)),
        }
    }

    /// A file that never reached storage has nothing to restore.
    async fn restore(&self, file: &StoredFile) -> Result<(), UploadError> {
        let stored = self.storage_dir.join(&file.reference);
        if stored_size(&file.token, &stored).await?.is_none() {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|err| io_error(&file.token, err))?;
        tokio::fs::rename(stored, self.staging_dir.join(&file.token))
            .await
            .map_err(|err| io_error(&file.token, err))
    }

    async fn remove(&self, reference: &str) -> Result<(), UploadError> {
        match tokio::fs::remove_file(self.storage_dir.join(reference)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(reference, err)),
        }
    }
}

/// Resolve one token with a per-attempt timeout and up to `retries` extra
/// attempts on retryable failures.
pub async fn resolve_with_retry(
    resolver: &dyn UploadResolver,
    form_id: u64,
    token: &str,
    timeout: Duration,
    retries: u32,
) -> Result<StoredFile, UploadError> {
    let mut attempt = 0;
    loop {
        let outcome = match tokio::time::timeout(timeout, resolver.resolve(form_id, token)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(UploadError::Timeout {
                token: token.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };
        match outcome {
            Err(err) if err.is_retryable() && attempt < retries => {
                attempt += 1;
                warn!(form_id, token, attempt, error = %err, "retrying upload resolution");
            }
            other => return other,
        }
    }
}
