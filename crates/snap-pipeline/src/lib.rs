//! Snap ingestion pipeline.
//!
//! This crate provides:
//! - The downloader for staged uploads
//! - Concurrent video export and thumbnail extraction with cross-task cancellation
//! - Create-only publishing of artifacts and the snap record
//! - Unconditional, idempotent cleanup of per-run resources
//! - The run controller with its deadline, state history and error taxonomy

pub mod artifacts;
pub mod cleanup;
pub mod config;
pub mod controller;
pub mod downloader;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod publisher;
pub mod workspace;

pub use artifacts::{ThumbnailArtifact, VideoArtifact};
pub use cleanup::{CleanupManager, CleanupOutcome, RunCleanup};
pub use config::PipelineConfig;
pub use controller::{PipelineServices, PipelineState, RunOutcome, RunReport, SnapPipeline};
pub use downloader::{DownloadedSource, Downloader};
pub use error::{CallerErrorKind, PipelineError, PipelineResult};
pub use logging::RunLogger;
pub use publisher::{PublishRequest, PublishedSnap, ResultPublisher, SnapIdGenerator};
pub use workspace::RunWorkspace;
