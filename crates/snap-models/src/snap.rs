//! Snap requests and records.

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::encoding::clamp_trim_length;
use crate::ids::{is_safe_path_segment, DiaryId, SnapId, UploadToken};

/// Error parsing a [`SnapDate`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid snap date '{0}', expected YYYY-MM-DD")]
pub struct SnapDateError(pub String);

/// Calendar day a snap is filed under, `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SnapDate(NaiveDate);

impl SnapDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }
}

impl FromStr for SnapDate {
    type Err = SnapDateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // chrono accepts unpadded fields; the stored format is strictly padded.
        if s.len() != 10 {
            return Err(SnapDateError(s.to_string()));
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| SnapDateError(s.to_string()))
    }
}

impl TryFrom<String> for SnapDate {
    type Error = SnapDateError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SnapDate> for String {
    fn from(d: SnapDate) -> Self {
        d.to_string()
    }
}

impl fmt::Display for SnapDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

fn validate_path_segment(value: &str) -> Result<(), ValidationError> {
    if is_safe_path_segment(value) {
        Ok(())
    } else {
        Err(ValidationError::new("path_segment"))
    }
}

/// Trim request from the client editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct MediaEditOptions {
    /// Name of the staged upload under `temp/{token}/`
    #[validate(length(min = 1, max = 255), custom(function = "validate_path_segment"))]
    pub filename: String,

    /// Trim start in milliseconds
    #[serde(rename = "start")]
    pub start_ms: u64,

    /// Requested trim length in seconds (clamped to 1..=5)
    #[serde(rename = "length")]
    pub length_sec: f64,
}

/// The effective trim window of one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimWindow {
    pub start_ms: u64,
    pub length_sec: f64,
}

impl TrimWindow {
    pub fn new(start_ms: u64, requested_length_sec: f64) -> Self {
        Self {
            start_ms,
            length_sec: clamp_trim_length(requested_length_sec),
        }
    }

    pub fn start_secs(&self) -> f64 {
        self.start_ms as f64 / 1000.0
    }

    /// Position of the window end on the source timeline.
    pub fn end_secs(&self) -> f64 {
        self.start_secs() + self.length_sec
    }
}

impl From<&MediaEditOptions> for TrimWindow {
    fn from(opts: &MediaEditOptions) -> Self {
        Self::new(opts.start_ms, opts.length_sec)
    }
}

/// Body of a `createSnap` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapInput {
    #[validate(length(min = 1, max = 128), custom(function = "validate_path_segment"))]
    pub diary_id: String,

    #[validate(length(min = 1, max = 256), custom(function = "validate_path_segment"))]
    pub upload_token: String,

    #[schemars(with = "String")]
    pub date: SnapDate,

    #[validate(nested)]
    pub media_edit_options: MediaEditOptions,
}

impl CreateSnapInput {
    pub fn diary_id(&self) -> DiaryId {
        DiaryId::from_string(self.diary_id.clone())
    }

    pub fn upload_token(&self) -> UploadToken {
        UploadToken::from_string(self.upload_token.clone())
    }

    pub fn trim_window(&self) -> TrimWindow {
        TrimWindow::from(&self.media_edit_options)
    }
}

/// A published snap, stored at `users/{uid}/diaries/{diaryId}/snaps/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapRecord {
    #[serde(skip)]
    pub id: Option<SnapId>,
    pub date: SnapDate,
    #[serde(rename = "mediaLength")]
    pub media_length_sec: f64,
    pub video_url: String,
    pub thumbnail_url: String,
    pub is_thumbnail_dark: bool,
}

impl SnapRecord {
    pub fn summary(&self) -> SnapSummary {
        SnapSummary {
            date: self.date,
            media_length_sec: self.media_length_sec,
            video_url: self.video_url.clone(),
            thumbnail_url: self.thumbnail_url.clone(),
            is_thumbnail_dark: self.is_thumbnail_dark,
        }
    }
}

/// What the caller receives after a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SnapSummary {
    #[schemars(with = "String")]
    pub date: SnapDate,
    #[serde(rename = "mediaLength")]
    pub media_length_sec: f64,
    pub video_url: String,
    pub thumbnail_url: String,
    pub is_thumbnail_dark: bool,
}
