//! Pipeline controller.
//!
//! One call to [`SnapPipeline::run`] is one run:
//!
//! ```text
//! Created -> Downloading -> Transcoding -> Publishing -> CleaningUp -> Completed
//!                 |              |              |             ^      \-> Failed
//!                 +--------------+--------------+-------------+
//! ```
//!
//! Every exit after `Created` passes through `CleaningUp`. The transcode
//! stage runs the video export and the thumbnail concurrently and joins both;
//! the first task to fail cancels the other. A wall-clock deadline covers
//! download, transcode and publish.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{info, Instrument};
use validator::Validate;

use snap_firestore::{ProfileStore, SnapStore, UploadTokenStore};
use snap_media::{progress_channel, MediaError, MediaProcessor, MonotonicProgress};
use snap_models::{is_safe_path_segment, CreateSnapInput, RunId, SnapId, SnapSummary, TrimWindow};
use snap_storage::BlobStore;

use crate::artifacts::{ThumbnailArtifact, VideoArtifact};
use crate::cleanup::{CleanupManager, CleanupOutcome, RunCleanup};
use crate::config::PipelineConfig;
use crate::downloader::Downloader;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::RunLogger;
use crate::metrics;
use crate::publisher::{PublishRequest, PublishedSnap, ResultPublisher};
use crate::workspace::RunWorkspace;

/// Run lifecycle states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Downloading,
    Transcoding,
    Publishing,
    CleaningUp,
    Completed,
    /// Carries the error kind label
    Failed(String),
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Downloading => write!(f, "downloading"),
            Self::Transcoding => write!(f, "transcoding"),
            Self::Publishing => write!(f, "publishing"),
            Self::CleaningUp => write!(f, "cleaning_up"),
            Self::Completed => write!(f, "completed"),
            Self::Failed(reason) => write!(f, "failed({})", reason),
        }
    }
}

/// Observable history of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    /// Every state entered, in order
    pub states: Vec<PipelineState>,
    /// Encode progress fractions that were reported, strictly increasing
    pub progress: Vec<f64>,
    pub effective_length_sec: Option<f64>,
    pub published: Option<SnapId>,
    pub cleanup: Option<CleanupOutcome>,
}

impl RunReport {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            states: Vec::new(),
            progress: Vec::new(),
            effective_length_sec: None,
            published: None,
            cleanup: None,
        }
    }

    fn enter(&mut self, state: PipelineState) {
        info!(
            run_id = %self.run_id,
            from = %self.state().map(ToString::to_string).unwrap_or_default(),
            to = %state,
            "Pipeline state transition"
        );
        self.states.push(state);
    }

    /// Current state.
    pub fn state(&self) -> Option<&PipelineState> {
        self.states.last()
    }

    pub fn visited(&self, state: &PipelineState) -> bool {
        self.states.contains(state)
    }
}

/// Result of a run together with its history.
#[derive(Debug)]
pub struct RunOutcome {
    pub result: PipelineResult<SnapSummary>,
    pub report: RunReport,
}

/// External services a pipeline runs against.
#[derive(Clone)]
pub struct PipelineServices {
    pub blob: Arc<dyn BlobStore>,
    pub tokens: Arc<dyn UploadTokenStore>,
    pub snaps: Arc<dyn SnapStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub media: Arc<dyn MediaProcessor>,
}

/// Orchestrates download, transcode, publish and cleanup.
#[derive(Clone)]
pub struct SnapPipeline {
    config: PipelineConfig,
    downloader: Downloader,
    publisher: ResultPublisher,
    cleanup: CleanupManager,
    media: Arc<dyn MediaProcessor>,
}

impl SnapPipeline {
    pub fn new(config: PipelineConfig, services: PipelineServices) -> PipelineResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.download_connect_timeout)
            .build()
            .map_err(|e| PipelineError::internal(format!("failed to build HTTP client: {}", e)))?;

        let downloader = Downloader::new(
            Arc::clone(&services.blob),
            Arc::clone(&services.tokens),
            http,
            config.download_url_ttl,
        );
        let publisher = ResultPublisher::new(
            services.blob,
            services.snaps,
            services.profiles,
            config.media_root.clone(),
        );
        let cleanup = CleanupManager::new(services.tokens);

        Ok(Self {
            config,
            downloader,
            publisher,
            cleanup,
            media: services.media,
        })
    }

    /// Replace the record id source.
    pub fn with_id_generator(mut self, generator: impl Fn() -> SnapId + Send + Sync + 'static) -> Self {
        self.publisher = self.publisher.with_id_generator(generator);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline for an authenticated caller.
    pub async fn create_snap(&self, uid: &str, input: CreateSnapInput) -> PipelineResult<SnapSummary> {
        self.run(uid, input).await.result
    }

    /// Run the pipeline and return its history alongside the result.
    pub async fn run(&self, uid: &str, input: CreateSnapInput) -> RunOutcome {
        let started = Instant::now();
        let run_id = RunId::new();
        let logger = RunLogger::new(&run_id, "create_snap");
        let mut report = RunReport::new(run_id);

        // Rejected requests hold no run resources.
        if let Err(e) = check_request(uid, &input) {
            logger.log_warning(&format!("Rejected request: {}", e));
            report.enter(PipelineState::Failed(e.kind_label().to_string()));
            metrics::record_run(e.kind_label(), started.elapsed());
            return RunOutcome {
                result: Err(e),
                report,
            };
        }

        report.enter(PipelineState::Created);

        let token = input.upload_token();
        let window = input.trim_window();
        report.effective_length_sec = Some(window.length_sec);

        let workspace = RunWorkspace::for_token(&self.config.work_root, &token);
        let cleanup = self.cleanup.for_run(workspace.clone(), token);

        logger.log_start(&format!(
            "diary={} start_ms={} length={:.3}s (requested {:.3}s)",
            input.diary_id,
            window.start_ms,
            window.length_sec,
            input.media_edit_options.length_sec
        ));

        let deadline = self.config.run_timeout;
        let outcome = tokio::time::timeout(
            deadline,
            self.execute(uid, &input, &workspace, &cleanup, window, &logger, &mut report)
                .instrument(logger.create_span()),
        )
        .await
        .unwrap_or_else(|_| Err(PipelineError::Timeout(deadline)));

        // The record is committed at this point; the profile write has its own bound.
        if outcome.is_ok() {
            self.publisher
                .remember_length(
                    uid,
                    input.media_edit_options.length_sec,
                    self.config.profile_update_timeout,
                )
                .await;
        }

        report.enter(PipelineState::CleaningUp);
        let cleanup_result = cleanup.execute().await;
        if let Ok(done) = &cleanup_result {
            report.cleanup = Some(*done);
        }

        let result = match (outcome, cleanup_result) {
            (Ok(published), Ok(_)) => Ok(published.record.summary()),
            (Ok(published), Err(e)) => Err(match e {
                PipelineError::CleanupError { message, .. } => PipelineError::CleanupError {
                    message,
                    published: Some(published.id),
                },
                other => other,
            }),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(cleanup_err)) => {
                logger
                    .child("cleanup")
                    .log_error(&format!("Cleanup after failed run: {}", cleanup_err));
                Err(e)
            }
        };

        let label = match &result {
            Ok(summary) => {
                report.enter(PipelineState::Completed);
                logger.log_completion(&format!(
                    "media_length={:.3}s dark={} in {:.2}s",
                    summary.media_length_sec,
                    summary.is_thumbnail_dark,
                    started.elapsed().as_secs_f64()
                ));
                "success"
            }
            Err(e) => {
                report.enter(PipelineState::Failed(e.kind_label().to_string()));
                logger.log_error(&e.to_string());
                e.kind_label()
            }
        };
        metrics::record_run(label, started.elapsed());

        RunOutcome { result, report }
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &self,
        uid: &str,
        input: &CreateSnapInput,
        workspace: &RunWorkspace,
        cleanup: &RunCleanup,
        window: TrimWindow,
        logger: &RunLogger,
        report: &mut RunReport,
    ) -> PipelineResult<PublishedSnap> {
        report.enter(PipelineState::Downloading);
        let stage = Instant::now();
        let token = input.upload_token();
        self.downloader.authorize(uid, &token).await?;
        cleanup.claim_workspace().await?;
        cleanup.claim_token();
        let source = self
            .downloader
            .fetch(workspace, &token, &input.media_edit_options.filename)
            .await?;
        metrics::record_stage("download", stage.elapsed());

        report.enter(PipelineState::Transcoding);
        let stage = Instant::now();
        let (video, thumbnail) = self
            .transcode(&source.path, workspace, window, logger, &mut report.progress)
            .await?;
        metrics::record_stage("transcode", stage.elapsed());

        if thumbnail.average_brightness.is_none() {
            logger.log_warning("Thumbnail could not be measured, classified as dark");
        }

        report.enter(PipelineState::Publishing);
        let stage = Instant::now();
        let diary_id = input.diary_id();
        let published = self
            .publisher
            .publish(PublishRequest {
                uid,
                diary_id: &diary_id,
                date: input.date,
                window,
                video,
                thumbnail,
            })
            .await?;
        metrics::record_stage("publish", stage.elapsed());

        report.published = Some(published.id.clone());
        Ok(published)
    }

    /// Run both transcode tasks against the same source and join them.
    async fn transcode(
        &self,
        source: &Path,
        workspace: &RunWorkspace,
        window: TrimWindow,
        logger: &RunLogger,
        progress_log: &mut Vec<f64>,
    ) -> PipelineResult<(VideoArtifact, ThumbnailArtifact)> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (progress_tx, mut progress_rx) = progress_channel();
        let video_path = workspace.video_path();
        let thumbnail_path = workspace.thumbnail_path();

        // Returns true for the call that flips the signal.
        let trip = || cancel_tx.send_if_modified(|cancelled| !std::mem::replace(cancelled, true));

        let video_task = async {
            let result = self
                .media
                .export_video(source, &video_path, window, progress_tx, cancel_rx.clone())
                .await
                .and_then(|()| {
                    if video_path.exists() {
                        Ok(())
                    } else {
                        Err(MediaError::FileNotFound(video_path.clone()))
                    }
                });
            let tripped = result.is_err() && trip();
            (result, tripped)
        };

        let thumbnail_task = async {
            let result = self
                .media
                .extract_thumbnail(source, &thumbnail_path, window, cancel_rx.clone())
                .await;
            let tripped = result.is_err() && trip();
            (result, tripped)
        };

        let progress_task = async {
            let progress_logger = logger.child("export_video");
            let mut monotonic = MonotonicProgress::new();
            while let Some(tick) = progress_rx.recv().await {
                if let Some(fraction) = monotonic.observe(tick) {
                    progress_logger.log_progress(&format!(
                        "{:.0}% ({:.2}s of {:.2}s)",
                        fraction * 100.0,
                        tick.elapsed_secs,
                        tick.total_secs
                    ));
                    progress_log.push(fraction);
                }
            }
        };

        let ((video_result, video_tripped), (thumbnail_result, thumbnail_tripped), ()) =
            tokio::join!(video_task, thumbnail_task, progress_task);

        match (video_result, thumbnail_result) {
            (Ok(()), Ok(verdict)) => Ok((
                VideoArtifact::new(video_path),
                ThumbnailArtifact::from_verdict(thumbnail_path, verdict),
            )),
            (video, thumbnail) => {
                let failures = [
                    video.err().map(|e| (PipelineError::encode(e), video_tripped)),
                    thumbnail
                        .err()
                        .map(|e| (PipelineError::thumbnail(e), thumbnail_tripped)),
                ];
                Err(first_failure(failures))
            }
        }
    }
}

/// The failure that cancelled the run, else any real failure, else `Cancelled`.
fn first_failure(failures: [Option<(PipelineError, bool)>; 2]) -> PipelineError {
    let mut real: Vec<(PipelineError, bool)> = failures
        .into_iter()
        .flatten()
        .filter(|(e, _)| !e.is_cancelled())
        .collect();
    real.sort_by_key(|(_, tripped)| !*tripped);
    real.into_iter()
        .next()
        .map(|(e, _)| e)
        .unwrap_or(PipelineError::Cancelled)
}

fn check_request(uid: &str, input: &CreateSnapInput) -> PipelineResult<()> {
    if uid.trim().is_empty() || !is_safe_path_segment(uid) {
        return Err(PipelineError::unauthenticated(
            "The function must be called while authenticated.",
        ));
    }
    input
        .validate()
        .map_err(|e| PipelineError::invalid_argument(e.to_string()))
}
