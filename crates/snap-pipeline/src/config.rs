//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use snap_models::DEFAULT_MEDIA_ROOT;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Parent directory of per-run workspaces
    pub work_root: PathBuf,
    /// Storage prefix for published media
    pub media_root: String,
    /// Wall-clock budget for download, both transcodes and publish
    pub run_timeout: Duration,
    /// Lifetime of the signed URL used to fetch the staged upload
    pub download_url_ttl: Duration,
    /// Connect timeout for the staged-upload fetch
    pub download_connect_timeout: Duration,
    /// Bound on the `lastSnapLength` write made after the run deadline
    pub profile_update_timeout: Duration,
    /// FFmpeg binary
    pub ffmpeg_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_root: std::env::temp_dir(),
            media_root: DEFAULT_MEDIA_ROOT.to_string(),
            run_timeout: Duration::from_secs(120),
            download_url_ttl: Duration::from_secs(15 * 60),
            download_connect_timeout: Duration::from_secs(10),
            profile_update_timeout: Duration::from_secs(5),
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_root: std::env::var("SNAP_WORK_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_root),
            media_root: std::env::var("SNAP_MEDIA_ROOT")
                .ok()
                .map(|s| s.trim_matches('/').to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.media_root),
            run_timeout: Duration::from_secs(
                std::env::var("SNAP_RUN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            download_url_ttl: Duration::from_secs(
                std::env::var("SNAP_DOWNLOAD_URL_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15 * 60),
            ),
            download_connect_timeout: Duration::from_secs(
                std::env::var("SNAP_DOWNLOAD_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            profile_update_timeout: Duration::from_secs(
                std::env::var("SNAP_PROFILE_UPDATE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            ffmpeg_path: std::env::var("SNAP_FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_defaults() {
        for key in ["SNAP_WORK_ROOT", "SNAP_MEDIA_ROOT", "SNAP_RUN_TIMEOUT_SECS"] {
            std::env::remove_var(key);
        }
        let config = PipelineConfig::from_env();
        assert_eq!(config.media_root, "diary-media");
        assert_eq!(config.run_timeout, Duration::from_secs(120));
        assert_eq!(config.work_root, std::env::temp_dir());
        assert_eq!(config.profile_update_timeout, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::set_var("SNAP_WORK_ROOT", "/var/snap-work");
        std::env::set_var("SNAP_MEDIA_ROOT", "/media/");
        std::env::set_var("SNAP_RUN_TIMEOUT_SECS", "not-a-number");

        let config = PipelineConfig::from_env();
        assert_eq!(config.work_root, PathBuf::from("/var/snap-work"));
        assert_eq!(config.media_root, "media");
        assert_eq!(config.run_timeout, Duration::from_secs(120));

        for key in ["SNAP_WORK_ROOT", "SNAP_MEDIA_ROOT", "SNAP_RUN_TIMEOUT_SECS"] {
            std::env::remove_var(key);
        }
    }
}
