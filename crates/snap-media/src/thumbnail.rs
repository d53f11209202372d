//! Thumbnail extraction.

use std::path::Path;

use snap_models::encoding::THUMBNAIL_SCALE_WIDTH;
use snap_models::TrimWindow;

use crate::brightness::{classify_file, BrightnessVerdict};
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Build the FFmpeg command grabbing one frame at the trim start.
pub fn build_thumbnail_command(source: &Path, output: &Path, window: TrimWindow) -> FfmpegCommand {
    let filter = format!("scale={}:-2", THUMBNAIL_SCALE_WIDTH);

    FfmpegCommand::new(source, output)
        .seek(window.start_secs())
        .single_frame()
        .video_filter(filter)
        .log_level("error")
}

/// Extract a thumbnail at the trim start and classify its brightness.
pub async fn generate_thumbnail(
    runner: FfmpegRunner,
    source: &Path,
    output: &Path,
    window: TrimWindow,
) -> MediaResult<BrightnessVerdict> {
    let cmd = build_thumbnail_command(source, output, window);
    runner.run(&cmd).await?;

    // Seeking past the end exits cleanly without writing a frame.
    if !tokio::fs::try_exists(output).await.unwrap_or(false) {
        return Err(MediaError::FileNotFound(output.to_path_buf()));
    }

    let path = output.to_path_buf();
    tokio::task::spawn_blocking(move || classify_file(&path))
        .await
        .map_err(|e| MediaError::internal(format!("Thumbnail classification panicked: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_thumbnail_command_args() {
        let cmd = build_thumbnail_command(
            &PathBuf::from("clip.mp4"),
            &PathBuf::from("thumbnail.png"),
            TrimWindow::new(2000, 3.0),
        );
        let joined = cmd.build_args().join(" ");
        assert!(joined.contains("-ss 2.000 -i clip.mp4"));
        assert!(joined.contains("-frames:v 1"));
        assert!(joined.contains("-vf scale=512:-2"));
        assert!(joined.ends_with("thumbnail.png"));
        assert!(!joined.contains("-t "));
    }
}
