//! Export profile for snap renditions.
//!
//! Every run produces exactly one video rendition and one thumbnail, so the
//! profile is fixed rather than negotiated per request.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Shortest trim window accepted (seconds).
pub const MIN_TRIM_LENGTH_SECS: f64 = 1.0;
/// Longest trim window accepted (seconds).
pub const MAX_TRIM_LENGTH_SECS: f64 = 5.0;

/// Output video filename inside the workspace and the storage prefix.
pub const VIDEO_FILENAME: &str = "export.webm";
/// Output video container.
pub const VIDEO_CONTAINER: &str = "webm";
/// Output video MIME type.
pub const VIDEO_CONTENT_TYPE: &str = "video/webm";
/// Default video codec (VP8)
pub const DEFAULT_VIDEO_CODEC: &str = "libvpx";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "libvorbis";
/// Target width of the rendition; height follows the source aspect.
pub const VIDEO_TARGET_WIDTH: u32 = 1080;
/// Display aspect ratio stamped on the rendition.
pub const VIDEO_ASPECT: &str = "9:16";

/// Thumbnail generation settings
pub const THUMBNAIL_FILENAME: &str = "thumbnail.png";
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/png";
pub const THUMBNAIL_SCALE_WIDTH: u32 = 512;

/// Clamp a requested trim length into the accepted window.
///
/// Non-finite input collapses to the minimum.
pub fn clamp_trim_length(length_secs: f64) -> f64 {
    if !length_secs.is_finite() {
        return MIN_TRIM_LENGTH_SECS;
    }
    length_secs.clamp(MIN_TRIM_LENGTH_SECS, MAX_TRIM_LENGTH_SECS)
}

/// Encoding profile for the video rendition.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExportProfile {
    /// Video codec
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Container format passed to `-f`
    #[serde(default = "default_container")]
    pub container: String,

    /// Target width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Display aspect ratio
    #[serde(default = "default_aspect")]
    pub aspect: String,

    /// Encoder speed options, favouring encode time over compression.
    #[serde(default = "default_speed_args")]
    pub speed_args: Vec<String>,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_container() -> String {
    VIDEO_CONTAINER.to_string()
}
fn default_width() -> u32 {
    VIDEO_TARGET_WIDTH
}
fn default_aspect() -> String {
    VIDEO_ASPECT.to_string()
}
fn default_speed_args() -> Vec<String> {
    ["-cpu-used", "5", "-deadline", "realtime"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ExportProfile {
    fn default() -> Self {
        Self {
            codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            container: default_container(),
            width: default_width(),
            aspect: default_aspect(),
            speed_args: default_speed_args(),
        }
    }
}

impl ExportProfile {
    /// Scale filter: fixed width, even height derived from the source.
    pub fn scale_filter(&self) -> String {
        format!("scale={}:-2,setdar={}", self.width, self.aspect.replace(':', "/"))
    }

    /// Convert to FFmpeg output arguments (everything after `-i` except the filter).
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
        ];
        args.extend(self.speed_args.clone());
        args.extend_from_slice(&["-f".to_string(), self.container.clone()]);
        args
    }
}
