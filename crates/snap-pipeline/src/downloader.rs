//! Fetches the staged upload into the run workspace.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use snap_firestore::UploadTokenStore;
use snap_models::keys::temp_upload_key;
use snap_models::{is_safe_path_segment, UploadSession, UploadToken};
use snap_storage::{BlobStore, StorageError};

use crate::error::{PipelineError, PipelineResult};
use crate::workspace::RunWorkspace;

/// The source file of a run, fully written to disk.
#[derive(Debug, Clone)]
pub struct DownloadedSource {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Resolves the staged upload of a token and streams it to the workspace.
#[derive(Clone)]
pub struct Downloader {
    blob: Arc<dyn BlobStore>,
    tokens: Arc<dyn UploadTokenStore>,
    http: reqwest::Client,
    url_ttl: Duration,
}

impl Downloader {
    pub fn new(
        blob: Arc<dyn BlobStore>,
        tokens: Arc<dyn UploadTokenStore>,
        http: reqwest::Client,
        url_ttl: Duration,
    ) -> Self {
        Self {
            blob,
            tokens,
            http,
            url_ttl,
        }
    }

    /// Check that `token` is a live upload grant issued to `uid`.
    ///
    /// A missing, expired or foreign token is reported as `NotFound` without
    /// distinguishing the cases.
    pub async fn authorize(&self, uid: &str, token: &UploadToken) -> PipelineResult<UploadSession> {
        if !is_safe_path_segment(token.as_str()) {
            return Err(PipelineError::invalid_argument("uploadToken is not a valid path segment"));
        }

        let session = self
            .tokens
            .get_session(token)
            .await?
            .ok_or_else(|| PipelineError::not_found(format!("upload token {}", token)))?;

        if session.is_expired(Utc::now()) {
            debug!(token = %token, valid_until = %session.valid_until, "Upload token expired");
            return Err(PipelineError::not_found(format!("upload token {}", token)));
        }

        if !session.is_owned_by(uid) {
            warn!(token = %token, uid = %uid, "Upload token presented by a different user");
            return Err(PipelineError::not_found(format!("upload token {}", token)));
        }

        Ok(session)
    }

    /// Create the workspace and stream `temp/{token}/{filename}` into it.
    pub async fn fetch(
        &self,
        workspace: &RunWorkspace,
        token: &UploadToken,
        filename: &str,
    ) -> PipelineResult<DownloadedSource> {
        if !is_safe_path_segment(filename) {
            return Err(PipelineError::invalid_argument("filename is not a valid path segment"));
        }

        workspace.create().await?;

        let key = temp_upload_key(token, filename);
        let url = self
            .blob
            .signed_url(&key, self.url_ttl)
            .await
            .map_err(|e| match e {
                StorageError::NotFound(_) => PipelineError::not_found(format!("staged upload {}", key)),
                other => PipelineError::transfer(format!("cannot sign {}: {}", key, other)),
            })?;

        let path = workspace.source_path(filename);
        let bytes = self.fetch_to_file(&url, &path).await?;

        info!(
            token = %token,
            path = %path.display(),
            bytes,
            "Downloaded staged upload"
        );

        Ok(DownloadedSource { path, bytes })
    }

    async fn fetch_to_file(&self, url: &str, path: &Path) -> PipelineResult<u64> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::transfer(format!("request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::FORBIDDEN {
            return Err(PipelineError::not_found(format!(
                "staged upload unavailable (HTTP {})",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(PipelineError::transfer(format!(
                "unexpected HTTP {} fetching staged upload",
                status.as_u16()
            )));
        }

        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                PipelineError::transfer(format!("stream interrupted after {} bytes: {}", written, e))
            })?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;

        if written == 0 {
            return Err(PipelineError::transfer("staged upload is empty"));
        }

        Ok(written)
    }
}
