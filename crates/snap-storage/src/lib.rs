//! S3-compatible storage client (Cloudflare R2 by default).
//!
//! This crate provides:
//! - Create-only uploads (`If-None-Match: *`)
//! - Presigned staging URLs and durable public URLs
//! - Object deletion
//! - The `BlobStore` trait the pipeline is written against

pub mod blob;
pub mod client;
pub mod error;

pub use blob::BlobStore;
pub use client::{public_object_url, R2Client, R2Config, MAX_PRESIGN_TTL};
pub use error::{StorageError, StorageResult};
