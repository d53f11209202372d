//! Object-store seam used by the pipeline.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::client::R2Client;
use crate::error::StorageResult;

/// Blob storage primitives the snap pipeline relies on.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short-lived GET URL for a staged object.
    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<String>;

    /// Upload `path` under `key`, failing with `AlreadyExists` instead of overwriting.
    async fn upload_create_only(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()>;

    /// Durable URL stored in published records; never a signed, expiring one.
    async fn resolve_url(&self, key: &str) -> StorageResult<String>;

    async fn delete(&self, key: &str) -> StorageResult<()>;

    async fn check_connectivity(&self) -> StorageResult<()>;
}

#[async_trait]
impl BlobStore for R2Client {
    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        self.presign_get(key, ttl).await
    }

    async fn upload_create_only(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()> {
        self.upload_file_if_absent(path, key, content_type).await
    }

    async fn resolve_url(&self, key: &str) -> StorageResult<String> {
        self.published_url(key)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.delete_object(key).await
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        R2Client::check_connectivity(self).await
    }
}
