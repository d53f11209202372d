//! Application state.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use snap_firestore::{
    FirestoreClient, ProfileRepository, SnapRepository, UploadTokenRepository, UPLOAD_TOKENS_COLLECTION,
};
use snap_media::{check_ffmpeg, FfmpegMediaProcessor};
use snap_models::ExportProfile;
use snap_pipeline::{PipelineConfig, PipelineServices, SnapPipeline};
use snap_storage::{BlobStore, R2Client};

use crate::auth::{IdTokenVerifier, JwksCache};
use crate::config::ApiConfig;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A backing service probed by `/ready`.
#[async_trait]
pub trait DependencyCheck: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self) -> Result<(), String>;
}

struct FirestoreCheck(FirestoreClient);

#[async_trait]
impl DependencyCheck for FirestoreCheck {
    fn name(&self) -> &'static str {
        "firestore"
    }

    async fn check(&self) -> Result<(), String> {
        self.0
            .check_connectivity(UPLOAD_TOKENS_COLLECTION)
            .await
            .map_err(|e| e.to_string())
    }
}

struct StorageCheck(Arc<dyn BlobStore>);

#[async_trait]
impl DependencyCheck for StorageCheck {
    fn name(&self) -> &'static str {
        "storage"
    }

    async fn check(&self) -> Result<(), String> {
        self.0.check_connectivity().await.map_err(|e| e.to_string())
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Arc<SnapPipeline>,
    pub verifier: Arc<dyn IdTokenVerifier>,
    pub checks: Vec<Arc<dyn DependencyCheck>>,
}

impl AppState {
    /// Create application state from the environment.
    pub async fn new(config: ApiConfig) -> Result<Self, BoxError> {
        let pipeline_config = PipelineConfig::from_env();

        let storage: Arc<dyn BlobStore> = Arc::new(R2Client::from_env().await?);
        let firestore = FirestoreClient::from_env().await?;

        match check_ffmpeg(&pipeline_config.ffmpeg_path) {
            Ok(path) => info!("Using FFmpeg at {}", path.display()),
            Err(e) => warn!("{}: {}", e, pipeline_config.ffmpeg_path.display()),
        }
        let media = Arc::new(FfmpegMediaProcessor::new(
            pipeline_config.ffmpeg_path.clone(),
            ExportProfile::default(),
        ));

        let services = PipelineServices {
            blob: Arc::clone(&storage),
            tokens: Arc::new(UploadTokenRepository::new(firestore.clone())),
            snaps: Arc::new(SnapRepository::new(firestore.clone())),
            profiles: Arc::new(ProfileRepository::new(firestore.clone())),
            media,
        };
        let pipeline = SnapPipeline::new(pipeline_config, services)?;

        let project_id = config
            .firebase_project_id
            .clone()
            .ok_or("FIREBASE_PROJECT_ID or GCP_PROJECT_ID must be set")?;
        let verifier = JwksCache::new(project_id).await?;

        let checks: Vec<Arc<dyn DependencyCheck>> = vec![
            Arc::new(FirestoreCheck(firestore)),
            Arc::new(StorageCheck(storage)),
        ];

        Ok(Self::from_parts(config, pipeline, Arc::new(verifier), checks))
    }

    /// Assemble state from already-built parts.
    pub fn from_parts(
        config: ApiConfig,
        pipeline: SnapPipeline,
        verifier: Arc<dyn IdTokenVerifier>,
        checks: Vec<Arc<dyn DependencyCheck>>,
    ) -> Self {
        Self {
            config,
            pipeline: Arc::new(pipeline),
            verifier,
            checks,
        }
    }
}
