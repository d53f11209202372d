//! FFmpeg CLI wrapper for snap media.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2` into normalized ticks
//! - Cancellation via a `watch` channel, with FFmpeg killed on cancel or drop
//! - The video export and thumbnail tasks
//! - Light/dark classification of thumbnails

pub mod brightness;
pub mod command;
pub mod error;
pub mod processor;
pub mod progress;
pub mod thumbnail;
pub mod transcode;

pub use brightness::{classify_file, classify_image, BrightnessVerdict, DARK_THRESHOLD};
pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use processor::{FfmpegMediaProcessor, MediaProcessor};
pub use progress::{
    progress_channel, FfmpegProgress, MonotonicProgress, ProgressReceiver, ProgressSender, ProgressTick,
};
pub use thumbnail::generate_thumbnail;
pub use transcode::export_video;
