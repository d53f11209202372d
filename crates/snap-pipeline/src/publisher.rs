//! Publishes a run's artifacts and its snap record.
//!
//! Order matters: both objects are uploaded create-only before the record is
//! written, so a reader never sees a record whose URLs dangle. If a later step
//! is rejected outright, the objects this run uploaded are deleted again.
//!
//! The profile's `lastSnapLength` is not part of publishing: it is written by
//! [`ResultPublisher::remember_length`] once the record exists.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use snap_firestore::{FirestoreError, ProfileStore, SnapStore};
use snap_models::encoding::{THUMBNAIL_CONTENT_TYPE, VIDEO_CONTENT_TYPE};
use snap_models::{DiaryId, MediaKeys, SnapDate, SnapId, SnapRecord, TrimWindow};
use snap_storage::BlobStore;

use crate::artifacts::{ThumbnailArtifact, VideoArtifact};
use crate::error::{PipelineError, PipelineResult};
use crate::metrics;

/// Source of fresh record ids.
pub type SnapIdGenerator = Arc<dyn Fn() -> SnapId + Send + Sync>;

/// Everything needed to publish one run.
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    pub uid: &'a str,
    pub diary_id: &'a DiaryId,
    pub date: SnapDate,
    pub window: TrimWindow,
    pub video: VideoArtifact,
    pub thumbnail: ThumbnailArtifact,
}

/// A published snap.
#[derive(Debug, Clone)]
pub struct PublishedSnap {
    pub id: SnapId,
    pub record: SnapRecord,
    pub keys: MediaKeys,
    pub video: VideoArtifact,
    pub thumbnail: ThumbnailArtifact,
}

/// Uploads artifacts and writes the snap record.
#[derive(Clone)]
pub struct ResultPublisher {
    blob: Arc<dyn BlobStore>,
    snaps: Arc<dyn SnapStore>,
    profiles: Arc<dyn ProfileStore>,
    media_root: String,
    id_generator: SnapIdGenerator,
}

impl ResultPublisher {
    pub fn new(
        blob: Arc<dyn BlobStore>,
        snaps: Arc<dyn SnapStore>,
        profiles: Arc<dyn ProfileStore>,
        media_root: impl Into<String>,
    ) -> Self {
        Self {
            blob,
            snaps,
            profiles,
            media_root: media_root.into(),
            id_generator: Arc::new(SnapId::generate),
        }
    }

    /// Replace the record id source.
    pub fn with_id_generator(mut self, generator: impl Fn() -> SnapId + Send + Sync + 'static) -> Self {
        self.id_generator = Arc::new(generator);
        self
    }

    pub async fn publish(&self, request: PublishRequest<'_>) -> PipelineResult<PublishedSnap> {
        let PublishRequest {
            uid,
            diary_id,
            date,
            window,
            mut video,
            mut thumbnail,
        } = request;

        for path in [&video.local_path, &thumbnail.local_path] {
            if !path.exists() {
                return Err(PipelineError::internal(format!(
                    "artifact missing before publish: {}",
                    path.display()
                )));
            }
        }

        let id = (self.id_generator)();
        let keys = MediaKeys::new(&self.media_root, diary_id, &id);

        self.upload(&video.local_path, &keys.video, VIDEO_CONTENT_TYPE).await?;
        video.storage_key = Some(keys.video.clone());

        if let Err(e) = self
            .upload(&thumbnail.local_path, &keys.thumbnail, THUMBNAIL_CONTENT_TYPE)
            .await
        {
            self.rollback(&[("video", &keys.video)]).await;
            return Err(e);
        }
        thumbnail.storage_key = Some(keys.thumbnail.clone());

        let urls = match self.resolve_urls(&keys).await {
            Ok(urls) => urls,
            Err(e) => {
                self.rollback(&[("video", &keys.video), ("thumbnail", &keys.thumbnail)])
                    .await;
                return Err(e);
            }
        };

        let record = SnapRecord {
            id: Some(id.clone()),
            date,
            media_length_sec: window.length_sec,
            video_url: urls.0,
            thumbnail_url: urls.1,
            is_thumbnail_dark: thumbnail.is_dark,
        };

        if let Err(e) = self.snaps.create_snap(uid, diary_id, &id, &record).await {
            // An ambiguous failure may still have written the record, so its
            // objects stay.
            if is_definite_rejection(&e) {
                self.rollback(&[("video", &keys.video), ("thumbnail", &keys.thumbnail)])
                    .await;
            }
            return Err(PipelineError::publish(format!("snap record {}: {}", id, e)));
        }

        info!(
            uid = %uid,
            diary_id = %diary_id,
            snap_id = %id,
            media_length = record.media_length_sec,
            is_thumbnail_dark = record.is_thumbnail_dark,
            "Published snap"
        );

        Ok(PublishedSnap {
            id,
            record,
            keys,
            video,
            thumbnail,
        })
    }

    /// Best-effort `lastSnapLength` update, bounded by `limit`.
    ///
    /// Returns whether the write landed. Failures and timeouts are only logged.
    pub async fn remember_length(&self, uid: &str, requested_length_sec: f64, limit: Duration) -> bool {
        match tokio::time::timeout(limit, self.profiles.set_last_snap_length(uid, requested_length_sec)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(uid = %uid, error = %e, "Failed to update lastSnapLength");
                false
            }
            Err(_) => {
                warn!(uid = %uid, limit_ms = limit.as_millis() as u64, "Timed out updating lastSnapLength");
                false
            }
        }
    }

    async fn upload(&self, path: &Path, key: &str, content_type: &str) -> PipelineResult<()> {
        self.blob
            .upload_create_only(path, key, content_type)
            .await
            .map_err(|e| {
                if e.is_conflict() {
                    PipelineError::publish(format!("refusing to overwrite existing object {}", key))
                } else {
                    PipelineError::publish(format!("upload {}: {}", key, e))
                }
            })
    }

    async fn resolve_urls(&self, keys: &MediaKeys) -> PipelineResult<(String, String)> {
        let video = self
            .blob
            .resolve_url(&keys.video)
            .await
            .map_err(|e| PipelineError::publish(format!("resolve {}: {}", keys.video, e)))?;
        let thumbnail = self
            .blob
            .resolve_url(&keys.thumbnail)
            .await
            .map_err(|e| PipelineError::publish(format!("resolve {}: {}", keys.thumbnail, e)))?;
        Ok((video, thumbnail))
    }

    /// Best-effort removal of objects uploaded by this run.
    async fn rollback(&self, objects: &[(&'static str, &str)]) {
        for (kind, key) in objects {
            metrics::record_publish_rollback(kind);
            match self.blob.delete(key).await {
                Ok(()) => info!(key = %key, "Rolled back uploaded object"),
                Err(e) => warn!(key = %key, error = %e, "Failed to roll back uploaded object"),
            }
        }
    }
}

/// True when the record store refused the write, so no record exists.
fn is_definite_rejection(err: &FirestoreError) -> bool {
    matches!(
        err,
        FirestoreError::AlreadyExists(_)
            | FirestoreError::PermissionDenied(_)
            | FirestoreError::PreconditionFailed(_)
            | FirestoreError::AuthError(_)
            | FirestoreError::RateLimited(_)
    )
}
