//! Storage error types.

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

/// Bucket-level failures.
///
/// `AlreadyExists` is the answer to a create-only write that lost the race
/// for its key; callers treat it as a refusal, never as success.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Bucket configuration invalid: {0}")]
    ConfigError(String),

    #[error("No object at {0}")]
    NotFound(String),

    #[error("Refusing to overwrite existing object {0}")]
    AlreadyExists(String),

    #[error("Put failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Listing failed: {0}")]
    ListFailed(String),

    #[error("Could not sign URL: {0}")]
    PresignFailed(String),

    #[error("Local file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 API error: {0}")]
    AwsSdk(String),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn already_exists(key: impl Into<String>) -> Self {
        Self::AlreadyExists(key.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn delete_failed(msg: impl Into<String>) -> Self {
        Self::DeleteFailed(msg.into())
    }

    /// The key already holds an object.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}
