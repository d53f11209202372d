//! Axum HTTP server for the snap ingestion backend.
//!
//! This crate provides:
//! - The `createSnap` callable over the callable-function JSON protocol
//! - Firebase ID token verification
//! - Liveness and readiness probes
//! - Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use auth::{AuthUser, IdTokenVerifier, JwksCache};
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::{AppState, DependencyCheck};
