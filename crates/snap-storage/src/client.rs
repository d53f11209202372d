//! R2 / S3 client implementation.

use std::path::Path;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Longest lifetime S3 SigV4 accepts for a presigned URL.
pub const MAX_PRESIGN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Configuration for R2 client.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
    /// Public base URL of the bucket. Published records link here, so it is
    /// required: presigned URLs expire while records do not.
    pub public_base_url: String,
}

impl R2Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("R2_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("R2_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("R2_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("R2_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("R2_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("R2_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("R2_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("R2_BUCKET_NAME not set"))?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
            public_base_url: std::env::var("R2_PUBLIC_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| StorageError::config_error("R2_PUBLIC_URL not set"))?,
        })
    }
}

/// Cloudflare R2 storage client.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl R2Client {
    /// Create a new R2 client from configuration.
    pub async fn new(config: R2Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let client = Client::from_conf(sdk_config);

        Ok(Self {
            client,
            bucket: config.bucket_name,
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = R2Config::from_env()?;
        Self::new(config).await
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload a file only if no object exists under `key` yet.
    ///
    /// Sends `If-None-Match: *`; a conflicting object yields
    /// [`StorageError::AlreadyExists`] and is left untouched.
    pub async fn upload_file_if_absent(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Uploading {} to {} (create-only)", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .if_none_match("*")
            .send()
            .await
            .map_err(|e| {
                let code = e.as_service_error().and_then(|se| se.code()).map(str::to_string);
                let status = e.raw_response().map(|r| r.status().as_u16());
                if is_precondition_failure(code.as_deref(), status) {
                    StorageError::already_exists(key)
                } else {
                    StorageError::upload_failed(DisplayErrorContext(&e).to_string())
                }
            })?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }

    /// Generate a presigned URL for GET (temporary, signed URL via S3 API).
    pub async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presign_config = PresigningConfig::expires_in(expires_in.min(MAX_PRESIGN_TTL))
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::PresignFailed(DisplayErrorContext(&e).to_string()))?;

        Ok(presigned.uri().to_string())
    }

    /// Unsigned URL of a published object under the public base.
    pub fn published_url(&self, key: &str) -> StorageResult<String> {
        if key.is_empty() {
            return Err(StorageError::PresignFailed("empty object key".to_string()));
        }
        Ok(public_object_url(&self.public_base_url, key))
    }

    /// Delete an object.
    pub async fn delete_object(&self, key: &str) -> StorageResult<()> {
        debug!("Deleting {}", key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    /// Check connectivity to R2 by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                StorageError::AwsSdk(format!(
                    "R2 connectivity check failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}

/// S3 answers a lost create-only race with 412; R2 may report 409 while a
/// concurrent conditional write is in flight.
fn is_precondition_failure(code: Option<&str>, status: Option<u16>) -> bool {
    matches!(code, Some("PreconditionFailed") | Some("ConditionalRequestConflict"))
        || matches!(status, Some(412) | Some(409))
}

/// Join a public base URL and an object key, escaping each key segment.
pub fn public_object_url(base: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("{}/{}", base.trim_end_matches('/'), encoded.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::BlobStore;
    use serial_test::serial;

    fn test_config(public_base_url: &str) -> R2Config {
        R2Config {
            endpoint_url: "https://account.r2.cloudflarestorage.com".to_string(),
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            bucket_name: "snaps".to_string(),
            region: "auto".to_string(),
            public_base_url: public_base_url.to_string(),
        }
    }

    #[test]
    fn test_precondition_detection() {
        assert!(is_precondition_failure(Some("PreconditionFailed"), Some(412)));
        assert!(is_precondition_failure(None, Some(409)));
        assert!(is_precondition_failure(Some("ConditionalRequestConflict"), None));
        assert!(!is_precondition_failure(Some("AccessDenied"), Some(403)));
        assert!(!is_precondition_failure(None, None));
    }

    #[test]
    fn test_public_object_url() {
        assert_eq!(
            public_object_url("https://media.example.com/", "diary-media/d1/s1/export.webm"),
            "https://media.example.com/diary-media/d1/s1/export.webm"
        );
        assert_eq!(
            public_object_url("https://cdn.example.com", "diary-media/my diary/s1/thumbnail.png"),
            "https://cdn.example.com/diary-media/my%20diary/s1/thumbnail.png"
        );
    }

    #[tokio::test]
    async fn test_published_url_never_expires() {
        let client = R2Client::new(test_config("https://media.example.com/")).await.unwrap();
        let url = client.published_url("diary-media/d/s/export.webm").unwrap();
        assert_eq!(url, "https://media.example.com/diary-media/d/s/export.webm");
        assert!(!url.contains("X-Amz-Expires"));
        assert!(!url.contains("X-Amz-Signature"));

        let url = client.resolve_url("diary-media/d/s/thumbnail.png").await.unwrap();
        assert!(!url.contains("X-Amz-Expires"));
    }

    #[tokio::test]
    async fn test_presign_is_offline() {
        let client = R2Client::new(test_config("https://media.example.com")).await.unwrap();
        let url = client
            .presign_get("temp/tok/clip.mp4", Duration::from_secs(900))
            .await
            .unwrap();
        assert!(url.contains("/snaps/temp/tok/clip.mp4"));
        assert!(url.contains("X-Amz-Signature="));
        assert!(url.contains("X-Amz-Expires=900"));
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::set_var("R2_ENDPOINT_URL", "https://r2.example.com");
        std::env::set_var("R2_ACCESS_KEY_ID", "id");
        std::env::set_var("R2_SECRET_ACCESS_KEY", "secret");
        std::env::set_var("R2_BUCKET_NAME", "bucket");
        std::env::remove_var("R2_PUBLIC_URL");

        // Without a public base every published URL would expire.
        assert!(matches!(R2Config::from_env(), Err(StorageError::ConfigError(_))));

        std::env::set_var("R2_PUBLIC_URL", "  ");
        assert!(matches!(R2Config::from_env(), Err(StorageError::ConfigError(_))));

        std::env::set_var("R2_PUBLIC_URL", "https://media.example.com");
        let config = R2Config::from_env().unwrap();
        assert_eq!(config.region, "auto");
        assert_eq!(config.public_base_url, "https://media.example.com");

        std::env::remove_var("R2_BUCKET_NAME");
        assert!(matches!(R2Config::from_env(), Err(StorageError::ConfigError(_))));

        for key in [
            "R2_ENDPOINT_URL",
            "R2_ACCESS_KEY_ID",
            "R2_SECRET_ACCESS_KEY",
            "R2_PUBLIC_URL",
        ] {
            std::env::remove_var(key);
        }
    }
}
