//! Shared data models for the snap ingestion backend.
//!
//! This crate provides Serde-serializable types for:
//! - Identifiers (runs, snaps, diaries, upload tokens)
//! - Snap requests, records and calendar dates
//! - Upload sessions issued by the token service
//! - The fixed export profile and trim bounds
//! - Storage key conventions shared with the cascading-delete listeners

pub mod encoding;
pub mod ids;
pub mod keys;
pub mod snap;
pub mod upload;

pub use encoding::{clamp_trim_length, ExportProfile, MAX_TRIM_LENGTH_SECS, MIN_TRIM_LENGTH_SECS};
pub use ids::{is_safe_path_segment, DiaryId, RunId, SnapId, UploadToken};
pub use keys::{MediaKeys, DEFAULT_MEDIA_ROOT, TEMP_UPLOAD_ROOT};
pub use snap::{CreateSnapInput, MediaEditOptions, SnapDate, SnapDateError, SnapRecord, SnapSummary, TrimWindow};
pub use upload::UploadSession;
