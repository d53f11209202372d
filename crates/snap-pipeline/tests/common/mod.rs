//! In-memory services for pipeline tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use image::{ImageBuffer, Rgb};
use tempfile::TempDir;
use tokio::sync::{watch, Notify};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use snap_firestore::{FirestoreError, FirestoreResult, ProfileStore, SnapStore, UploadTokenStore};
use snap_media::{classify_file, BrightnessVerdict, MediaError, MediaProcessor, MediaResult, ProgressSender, ProgressTick};
use snap_models::{
    CreateSnapInput, DiaryId, MediaEditOptions, SnapId, SnapRecord, TrimWindow, UploadSession, UploadToken,
};
use snap_pipeline::{PipelineConfig, PipelineServices, SnapPipeline};
use snap_storage::{BlobStore, StorageError, StorageResult};

pub const UID: &str = "user-1";
pub const DIARY: &str = "diary1";
pub const SOURCE_BYTES: &[u8] = b"\x1a\x45\xdf\xa3 fake source clip";

// =============================================================================
// Blob store
// =============================================================================

/// Object store that keeps uploads in memory and signs URLs against a mock server.
pub struct MemoryBlobStore {
    download_base: String,
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail_resolve: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new(download_base: impl Into<String>) -> Self {
        Self {
            download_base: download_base.into(),
            objects: Mutex::new(HashMap::new()),
            deleted: Mutex::new(Vec::new()),
            fail_resolve: AtomicBool::new(false),
        }
    }

    pub fn put(&self, key: &str, data: &[u8]) {
        self.objects.lock().unwrap().insert(key.to_string(), data.to_vec());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn signed_url(&self, key: &str, _ttl: Duration) -> StorageResult<String> {
        Ok(format!("{}/{}", self.download_base, key))
    }

    async fn upload_create_only(&self, path: &Path, key: &str, _content_type: &str) -> StorageResult<()> {
        let data = tokio::fs::read(path).await?;
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(key) {
            return Err(StorageError::already_exists(key));
        }
        objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn resolve_url(&self, key: &str) -> StorageResult<String> {
        if self.fail_resolve.load(Ordering::SeqCst) {
            return Err(StorageError::PresignFailed("signer offline".into()));
        }
        Ok(format!("https://media.test/{}", key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.lock().unwrap().remove(key);
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        Ok(())
    }
}

// =============================================================================
// Record stores
// =============================================================================

#[derive(Default)]
pub struct MemoryTokenStore {
    pub sessions: Mutex<HashMap<String, UploadSession>>,
    pub deletes: AtomicUsize,
    pub fail_delete: AtomicBool,
}

impl MemoryTokenStore {
    pub fn issue(&self, token: &str, owner: &str, ttl: chrono::Duration) {
        let session = UploadSession::new(UploadToken::from(token), owner, Utc::now() + ttl);
        self.sessions.lock().unwrap().insert(token.to_string(), session);
    }

    pub fn contains(&self, token: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(token)
    }
}

#[async_trait]
impl UploadTokenStore for MemoryTokenStore {
    async fn get_session(&self, token: &UploadToken) -> FirestoreResult<Option<UploadSession>> {
        Ok(self.sessions.lock().unwrap().get(token.as_str()).cloned())
    }

    async fn delete_session(&self, token: &UploadToken) -> FirestoreResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(FirestoreError::ServerError(503, "unavailable".into()));
        }
        self.sessions.lock().unwrap().remove(token.as_str());
        Ok(())
    }
}

/// How the snap store answers a create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapWrite {
    Accept,
    RejectConflict,
    ServerError,
}

pub struct MemorySnapStore {
    pub records: Mutex<HashMap<String, SnapRecord>>,
    pub mode: Mutex<SnapWrite>,
}

impl Default for MemorySnapStore {
    fn default() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            mode: Mutex::new(SnapWrite::Accept),
        }
    }
}

impl MemorySnapStore {
    pub fn path(uid: &str, diary_id: &str, snap_id: &str) -> String {
        format!("users/{}/diaries/{}/snaps/{}", uid, diary_id, snap_id)
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn only(&self) -> (String, SnapRecord) {
        let records = self.records.lock().unwrap();
        assert_eq!(records.len(), 1, "expected exactly one record");
        let (path, record) = records.iter().next().unwrap();
        (path.clone(), record.clone())
    }
}

#[async_trait]
impl SnapStore for MemorySnapStore {
    async fn create_snap(
        &self,
        uid: &str,
        diary_id: &DiaryId,
        snap_id: &SnapId,
        record: &SnapRecord,
    ) -> FirestoreResult<()> {
        match *self.mode.lock().unwrap() {
            SnapWrite::RejectConflict => return Err(FirestoreError::AlreadyExists(snap_id.to_string())),
            SnapWrite::ServerError => return Err(FirestoreError::ServerError(500, "deadline".into())),
            SnapWrite::Accept => {}
        }
        let path = Self::path(uid, diary_id.as_str(), snap_id.as_str());
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&path) {
            return Err(FirestoreError::AlreadyExists(path));
        }
        records.insert(path, record.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryProfileStore {
    pub last_lengths: Mutex<HashMap<String, f64>>,
    pub fail: AtomicBool,
    pub hang: AtomicBool,
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn set_last_snap_length(&self, uid: &str, length_sec: f64) -> FirestoreResult<()> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(FirestoreError::PermissionDenied("rules".into()));
        }
        self.last_lengths.lock().unwrap().insert(uid.to_string(), length_sec);
        Ok(())
    }
}

// =============================================================================
// Media processor
// =============================================================================

/// Scripted behaviour of one transcode task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskScript {
    /// Succeed; the thumbnail is a uniform grey of this value
    Succeed(u8),
    /// Succeed but write a thumbnail that is not an image
    SucceedUnreadable,
    /// Fail immediately
    Fail,
    /// Wait until cancelled
    WaitForCancel,
    /// Never finish, ignoring cancellation
    Hang,
    /// Signal `video_started`, wait for `video_release`, then succeed
    Gated,
}

/// Media processor that writes small files instead of running FFmpeg.
pub struct FakeMediaProcessor {
    pub video: Mutex<TaskScript>,
    pub thumbnail: Mutex<TaskScript>,
    pub ticks: Mutex<Vec<(f64, f64)>>,
    pub video_windows: Mutex<Vec<TrimWindow>>,
    pub thumbnail_windows: Mutex<Vec<TrimWindow>>,
    pub video_cancelled: AtomicBool,
    pub thumbnail_cancelled: AtomicBool,
    pub video_started: Notify,
    pub video_release: Notify,
}

impl FakeMediaProcessor {
    pub fn new(video: TaskScript, thumbnail: TaskScript) -> Self {
        Self {
            video: Mutex::new(video),
            thumbnail: Mutex::new(thumbnail),
            ticks: Mutex::new(Vec::new()),
            video_windows: Mutex::new(Vec::new()),
            thumbnail_windows: Mutex::new(Vec::new()),
            video_cancelled: AtomicBool::new(false),
            thumbnail_cancelled: AtomicBool::new(false),
            video_started: Notify::new(),
            video_release: Notify::new(),
        }
    }
}

async fn wait_for_cancel(mut cancel_rx: watch::Receiver<bool>) {
    loop {
        let cancelled = *cancel_rx.borrow();
        if cancelled {
            return;
        }
        if cancel_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl MediaProcessor for FakeMediaProcessor {
    async fn export_video(
        &self,
        source: &Path,
        output: &Path,
        window: TrimWindow,
        progress: ProgressSender,
        cancel_rx: watch::Receiver<bool>,
    ) -> MediaResult<()> {
        self.video_windows.lock().unwrap().push(window);
        assert!(source.exists(), "source must be on disk before transcoding");

        let script = *self.video.lock().unwrap();
        match script {
            TaskScript::Fail => Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with status 1",
                Some("Unknown encoder 'libvpx'".into()),
                Some(1),
            )),
            TaskScript::WaitForCancel => {
                wait_for_cancel(cancel_rx).await;
                self.video_cancelled.store(true, Ordering::SeqCst);
                Err(MediaError::Cancelled)
            }
            TaskScript::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            TaskScript::Gated => {
                self.video_started.notify_one();
                self.video_release.notified().await;
                tokio::fs::write(output, b"webm").await?;
                Ok(())
            }
            TaskScript::Succeed(_) | TaskScript::SucceedUnreadable => {
                let ticks = self.ticks.lock().unwrap().clone();
                for (elapsed_secs, total_secs) in ticks {
                    let _ = progress.send(ProgressTick {
                        elapsed_secs,
                        total_secs,
                    });
                }
                tokio::fs::write(output, b"webm").await?;
                Ok(())
            }
        }
    }

    async fn extract_thumbnail(
        &self,
        _source: &Path,
        output: &Path,
        window: TrimWindow,
        cancel_rx: watch::Receiver<bool>,
    ) -> MediaResult<BrightnessVerdict> {
        self.thumbnail_windows.lock().unwrap().push(window);

        let script = *self.thumbnail.lock().unwrap();
        match script {
            TaskScript::Fail => Err(MediaError::FileNotFound(output.to_path_buf())),
            TaskScript::WaitForCancel => {
                wait_for_cancel(cancel_rx).await;
                self.thumbnail_cancelled.store(true, Ordering::SeqCst);
                Err(MediaError::Cancelled)
            }
            TaskScript::Hang => {
                std::future::pending::<()>().await;
                Err(MediaError::Cancelled)
            }
            TaskScript::Gated => Err(MediaError::internal("gated thumbnail is not supported")),
            TaskScript::Succeed(value) => {
                let img = ImageBuffer::from_pixel(32, 18, Rgb([value, value, value]));
                img.save(output)
                    .map_err(|e| MediaError::internal(e.to_string()))?;
                Ok(classify_file(output))
            }
            TaskScript::SucceedUnreadable => {
                tokio::fs::write(output, b"not a png").await?;
                Ok(classify_file(output))
            }
        }
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub server: MockServer,
    pub work_root: TempDir,
    pub blob: Arc<MemoryBlobStore>,
    pub tokens: Arc<MemoryTokenStore>,
    pub snaps: Arc<MemorySnapStore>,
    pub profiles: Arc<MemoryProfileStore>,
    pub media: Arc<FakeMediaProcessor>,
}

impl Harness {
    pub async fn new(video: TaskScript, thumbnail: TaskScript) -> Self {
        let server = MockServer::start().await;
        let blob = Arc::new(MemoryBlobStore::new(server.uri()));
        Self {
            server,
            work_root: TempDir::new().unwrap(),
            blob,
            tokens: Arc::new(MemoryTokenStore::default()),
            snaps: Arc::new(MemorySnapStore::default()),
            profiles: Arc::new(MemoryProfileStore::default()),
            media: Arc::new(FakeMediaProcessor::new(video, thumbnail)),
        }
    }

    pub fn config(&self) -> PipelineConfig {
        PipelineConfig {
            work_root: self.work_root.path().to_path_buf(),
            ..PipelineConfig::default()
        }
    }

    pub fn services(&self) -> PipelineServices {
        PipelineServices {
            blob: self.blob.clone(),
            tokens: self.tokens.clone(),
            snaps: self.snaps.clone(),
            profiles: self.profiles.clone(),
            media: self.media.clone(),
        }
    }

    pub fn pipeline(&self) -> SnapPipeline {
        self.pipeline_with(self.config())
    }

    pub fn pipeline_with(&self, config: PipelineConfig) -> SnapPipeline {
        SnapPipeline::new(config, self.services()).unwrap()
    }

    /// Issue a token to [`UID`] and stage `clip.mp4` under it.
    pub async fn stage(&self, token: &str) {
        self.tokens.issue(token, UID, chrono::Duration::minutes(10));
        Mock::given(method("GET"))
            .and(path(format!("/temp/{}/clip.mp4", token)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(SOURCE_BYTES))
            .mount(&self.server)
            .await;
    }

    pub fn workspace_dir(&self, token: &str) -> std::path::PathBuf {
        self.work_root.path().join(format!("temp_upload_{}", token))
    }
}

pub fn input(token: &str, start_ms: u64, length_sec: f64) -> CreateSnapInput {
    CreateSnapInput {
        diary_id: DIARY.to_string(),
        upload_token: token.to_string(),
        date: "2024-03-09".parse().unwrap(),
        media_edit_options: MediaEditOptions {
            filename: "clip.mp4".to_string(),
            start_ms,
            length_sec,
        },
    }
}
