//! Pipeline error types.

use std::time::Duration;

use thiserror::Error;

use snap_firestore::FirestoreError;
use snap_media::MediaError;
use snap_models::SnapId;
use snap_storage::StorageError;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Everything that can end a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Another run holds the workspace of the same upload token
    #[error("Upload already being processed: {0}")]
    InUse(String),

    #[error("Transfer failed: {0}")]
    TransferError(String),

    #[error("Encode failed: {0}")]
    EncodeError(String),

    #[error("Thumbnail failed: {0}")]
    ThumbnailError(String),

    #[error("Publish failed: {0}")]
    PublishError(String),

    #[error("Cleanup failed: {message}")]
    CleanupError {
        message: String,
        /// Record that was published before cleanup failed
        published: Option<SnapId>,
    },

    #[error("Run exceeded deadline of {0:?}")]
    Timeout(Duration),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Firestore error: {0}")]
    Firestore(#[from] FirestoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The error classes a caller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerErrorKind {
    Unauthenticated,
    InvalidArgument,
    Internal,
}

impl PipelineError {
    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::TransferError(msg.into())
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        Self::PublishError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Video task failure. A cancelled encode stays `Cancelled`.
    pub fn encode(err: MediaError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::EncodeError(err.detail())
        }
    }

    /// Thumbnail task failure. A cancelled extraction stays `Cancelled`.
    pub fn thumbnail(err: MediaError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::ThumbnailError(err.detail())
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Map to the class reported to the caller.
    pub fn caller_kind(&self) -> CallerErrorKind {
        match self {
            Self::Unauthenticated(_) => CallerErrorKind::Unauthenticated,
            Self::InvalidArgument(_) => CallerErrorKind::InvalidArgument,
            _ => CallerErrorKind::Internal,
        }
    }

    /// Stable label for metrics and logs.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::InUse(_) => "in_use",
            Self::TransferError(_) => "transfer_error",
            Self::EncodeError(_) => "encode_error",
            Self::ThumbnailError(_) => "thumbnail_error",
            Self::PublishError(_) => "publish_error",
            Self::CleanupError { .. } => "cleanup_error",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::Internal(_) | Self::Storage(_) | Self::Firestore(_) | Self::Io(_) => "internal",
        }
    }
}
