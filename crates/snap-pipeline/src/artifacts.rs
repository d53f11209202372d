//! Local outputs of the transcode stage.

use std::path::PathBuf;

use snap_media::BrightnessVerdict;

/// Re-encoded clip. `storage_key` is set once the publisher has uploaded it.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoArtifact {
    pub local_path: PathBuf,
    pub storage_key: Option<String>,
}

impl VideoArtifact {
    pub fn new(local_path: PathBuf) -> Self {
        Self {
            local_path,
            storage_key: None,
        }
    }
}

/// Thumbnail with its light/dark classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailArtifact {
    pub local_path: PathBuf,
    pub storage_key: Option<String>,
    pub width: u32,
    pub height: u32,
    pub average_brightness: Option<f64>,
    pub is_dark: bool,
}

impl ThumbnailArtifact {
    pub fn from_verdict(local_path: PathBuf, verdict: BrightnessVerdict) -> Self {
        Self {
            local_path,
            storage_key: None,
            width: verdict.width,
            height: verdict.height,
            average_brightness: verdict.average_brightness,
            is_dark: verdict.is_dark,
        }
    }
}
