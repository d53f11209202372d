//! Video rendition export.

use std::path::Path;
use tracing::debug;

use snap_models::{ExportProfile, TrimWindow};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::progress::{ProgressSender, ProgressTick};

/// Build the FFmpeg command that trims, scales and re-encodes the source.
pub fn build_export_command(
    source: &Path,
    output: &Path,
    window: TrimWindow,
    profile: &ExportProfile,
) -> FfmpegCommand {
    FfmpegCommand::new(source, output)
        .seek(window.start_secs())
        .duration(window.length_sec)
        .video_filter(profile.scale_filter())
        .output_args(profile.to_ffmpeg_args())
        .log_level("error")
}

/// Export the trimmed rendition, streaming progress ticks on the source timeline.
pub async fn export_video(
    runner: FfmpegRunner,
    source: &Path,
    output: &Path,
    window: TrimWindow,
    profile: &ExportProfile,
    progress: ProgressSender,
) -> MediaResult<()> {
    let cmd = build_export_command(source, output, window, profile);
    let start_secs = window.start_secs();
    let total_secs = window.end_secs();

    debug!(
        source = %source.display(),
        start_secs,
        length_secs = window.length_sec,
        "Exporting video rendition"
    );

    runner
        .run_with_progress(&cmd, move |p| {
            // Receiver gone means nobody is listening anymore.
            let _ = progress.send(ProgressTick {
                elapsed_secs: start_secs + p.out_time_secs(),
                total_secs,
            });
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_export_command_args() {
        let window = TrimWindow::new(2000, 10.0);
        let cmd = build_export_command(
            &PathBuf::from("/tmp/w/clip.mp4"),
            &PathBuf::from("/tmp/w/export.webm"),
            window,
            &ExportProfile::default(),
        );
        let args = cmd.build_args();
        let joined = args.join(" ");

        assert!(joined.contains("-ss 2.000 -t 5.000 -i /tmp/w/clip.mp4"));
        assert!(joined.contains("-vf scale=1080:-2,setdar=9/16"));
        assert!(joined.contains("-c:v libvpx"));
        assert!(joined.contains("-c:a libvorbis"));
        assert!(joined.contains("-cpu-used 5 -deadline realtime"));
        assert!(joined.ends_with("-f webm /tmp/w/export.webm"));
    }
}
