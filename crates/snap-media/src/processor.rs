//! Media processing seam used by the pipeline.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::watch;

use snap_models::{ExportProfile, TrimWindow};

use crate::brightness::BrightnessVerdict;
use crate::command::FfmpegRunner;
use crate::error::MediaResult;
use crate::progress::ProgressSender;
use crate::{thumbnail, transcode};

/// The two transcode tasks of a run.
///
/// Both read the same source file concurrently and write distinct outputs.
/// Implementations must stop promptly with [`crate::MediaError::Cancelled`]
/// once `cancel_rx` turns `true`.
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    /// Trim, scale and re-encode `source` into `output`.
    async fn export_video(
        &self,
        source: &Path,
        output: &Path,
        window: TrimWindow,
        progress: ProgressSender,
        cancel_rx: watch::Receiver<bool>,
    ) -> MediaResult<()>;

    /// Write a thumbnail of the frame at the trim start and classify it.
    async fn extract_thumbnail(
        &self,
        source: &Path,
        output: &Path,
        window: TrimWindow,
        cancel_rx: watch::Receiver<bool>,
    ) -> MediaResult<BrightnessVerdict>;
}

/// [`MediaProcessor`] backed by the FFmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegMediaProcessor {
    ffmpeg: PathBuf,
    profile: ExportProfile,
}

impl Default for FfmpegMediaProcessor {
    fn default() -> Self {
        Self::new(PathBuf::from("ffmpeg"), ExportProfile::default())
    }
}

impl FfmpegMediaProcessor {
    pub fn new(ffmpeg: impl Into<PathBuf>, profile: ExportProfile) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            profile,
        }
    }

    fn runner(&self, cancel_rx: watch::Receiver<bool>) -> FfmpegRunner {
        FfmpegRunner::new()
            .with_program(&self.ffmpeg)
            .with_cancel(cancel_rx)
    }
}

#[async_trait]
impl MediaProcessor for FfmpegMediaProcessor {
    async fn export_video(
        &self,
        source: &Path,
        output: &Path,
        window: TrimWindow,
        progress: ProgressSender,
        cancel_rx: watch::Receiver<bool>,
    ) -> MediaResult<()> {
        transcode::export_video(
            self.runner(cancel_rx),
            source,
            output,
            window,
            &self.profile,
            progress,
        )
        .await
    }

    async fn extract_thumbnail(
        &self,
        source: &Path,
        output: &Path,
        window: TrimWindow,
        cancel_rx: watch::Receiver<bool>,
    ) -> MediaResult<BrightnessVerdict> {
        thumbnail::generate_thumbnail(self.runner(cancel_rx), source, output, window).await
    }
}
