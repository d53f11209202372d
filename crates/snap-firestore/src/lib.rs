//! Firestore REST API client.
//!
//! This crate provides:
//! - Service account authentication via gcp_auth, or an unauthenticated emulator
//! - Create-only writes, merge updates and idempotent deletes
//! - Retry with backoff for idempotent calls
//! - Repositories for upload tokens, snaps and user profiles, with the
//!   store traits the pipeline is written against

pub mod client;
pub mod error;
pub mod metrics;
pub mod repos;
pub mod retry;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use repos::{
    ProfileRepository, ProfileStore, SnapRepository, SnapStore, UploadTokenRepository,
    UploadTokenStore, UPLOAD_TOKENS_COLLECTION, USERS_COLLECTION,
};
pub use retry::RetryConfig;
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
