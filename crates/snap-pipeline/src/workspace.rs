//! Per-run scratch directory.

use std::io;
use std::path::{Path, PathBuf};

use snap_models::encoding::{THUMBNAIL_FILENAME, VIDEO_FILENAME};
use snap_models::UploadToken;

/// Directory name prefix, followed by the upload token.
pub const WORKSPACE_DIR_PREFIX: &str = "temp_upload_";

/// Scratch directory owned by exactly one run.
///
/// The name is derived from the upload token. A run takes ownership with
/// [`RunWorkspace::claim`], which fails if the directory already exists, so two
/// submissions of the same token never share it. Outputs live in `out/` so a
/// source file can never be named like one of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunWorkspace {
    dir: PathBuf,
}

impl RunWorkspace {
    pub fn for_token(work_root: &Path, token: &UploadToken) -> Self {
        Self {
            dir: work_root.join(format!("{}{}", WORKSPACE_DIR_PREFIX, token.as_str())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn source_path(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.join("out")
    }

    pub fn video_path(&self) -> PathBuf {
        self.output_dir().join(VIDEO_FILENAME)
    }

    pub fn thumbnail_path(&self) -> PathBuf {
        self.output_dir().join(THUMBNAIL_FILENAME)
    }

    pub fn exists(&self) -> bool {
        self.dir.exists()
    }

    /// Create the run directory exclusively, then its output directory.
    ///
    /// Fails with `AlreadyExists` when the directory is already present, whether
    /// another run holds it or a crashed one left it behind.
    pub async fn claim(&self) -> io::Result<()> {
        if let Some(parent) = self.dir.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::create_dir(&self.dir).await?;
        tokio::fs::create_dir(self.output_dir()).await
    }

    /// Create the directory tree. Succeeds if it already exists.
    pub async fn create(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(self.output_dir()).await
    }

    /// Remove the directory tree. Returns `false` when there was nothing to remove.
    pub async fn remove(&self) -> io::Result<bool> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
