//! Typed repositories for upload tokens, snaps and user profiles.
//!
//! Document layout:
//! - `uploadTokens/{token}`: `{owner, validUntil}`, written by the token service
//! - `users/{uid}/diaries/{diaryId}/snaps/{snapId}`: published snaps
//! - `users/{uid}`: profile, carries `lastSnapLength`

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use snap_models::{DiaryId, SnapId, SnapRecord, UploadSession, UploadToken};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{Document, ToFirestoreValue, Value};

/// Collection holding upload grants.
pub const UPLOAD_TOKENS_COLLECTION: &str = "uploadTokens";

/// Collection holding user profiles.
pub const USERS_COLLECTION: &str = "users";

/// Upload-token lookups and consumption.
#[async_trait]
pub trait UploadTokenStore: Send + Sync {
    async fn get_session(&self, token: &UploadToken) -> FirestoreResult<Option<UploadSession>>;

    /// Delete the token record. Deleting a missing record succeeds.
    async fn delete_session(&self, token: &UploadToken) -> FirestoreResult<()>;
}

/// Create-only persistence of published snaps.
#[async_trait]
pub trait SnapStore: Send + Sync {
    /// Write the record under `snap_id`, failing with `AlreadyExists` if taken.
    async fn create_snap(
        &self,
        uid: &str,
        diary_id: &DiaryId,
        snap_id: &SnapId,
        record: &SnapRecord,
    ) -> FirestoreResult<()>;
}

/// Denormalized profile fields.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn set_last_snap_length(&self, uid: &str, length_sec: f64) -> FirestoreResult<()>;
}

// =============================================================================
// Upload tokens
// =============================================================================

/// Repository for upload-token documents.
#[derive(Clone)]
pub struct UploadTokenRepository {
    client: FirestoreClient,
}

impl UploadTokenRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Fetch an upload session. Returns `None` when the token does not exist.
    pub async fn get(&self, token: &UploadToken) -> FirestoreResult<Option<UploadSession>> {
        let doc = self
            .client
            .with_retry("get_upload_token", || {
                self.client.get_document(UPLOAD_TOKENS_COLLECTION, token.as_str())
            })
            .await?;

        doc.map(|d| document_to_upload_session(token, &d)).transpose()
    }

    pub async fn delete(&self, token: &UploadToken) -> FirestoreResult<()> {
        self.client
            .with_retry("delete_upload_token", || {
                self.client.delete_document(UPLOAD_TOKENS_COLLECTION, token.as_str())
            })
            .await?;
        debug!(token = %token, "Deleted upload token");
        Ok(())
    }
}

#[async_trait]
impl UploadTokenStore for UploadTokenRepository {
    async fn get_session(&self, token: &UploadToken) -> FirestoreResult<Option<UploadSession>> {
        self.get(token).await
    }

    async fn delete_session(&self, token: &UploadToken) -> FirestoreResult<()> {
        self.delete(token).await
    }
}

fn document_to_upload_session(token: &UploadToken, doc: &Document) -> FirestoreResult<UploadSession> {
    let owner: String = doc.get("owner").ok_or_else(|| {
        FirestoreError::invalid_response(format!("upload token {} has no owner", token))
    })?;
    let valid_until: DateTime<Utc> = doc.get("validUntil").ok_or_else(|| {
        FirestoreError::invalid_response(format!("upload token {} has no validUntil", token))
    })?;

    Ok(UploadSession::new(token.clone(), owner, valid_until))
}

// =============================================================================
// Snaps
// =============================================================================

/// Repository for snap documents.
#[derive(Clone)]
pub struct SnapRepository {
    client: FirestoreClient,
}

impl SnapRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// users/{uid}/diaries/{diary_id}/snaps
    fn collection_path(uid: &str, diary_id: &DiaryId) -> String {
        format!("{}/{}/diaries/{}/snaps", USERS_COLLECTION, uid, diary_id)
    }

    /// Create a snap document. Not retried: a lost response followed by a retry
    /// would report our own write as a conflict.
    pub async fn create(
        &self,
        uid: &str,
        diary_id: &DiaryId,
        snap_id: &SnapId,
        record: &SnapRecord,
    ) -> FirestoreResult<()> {
        let collection = Self::collection_path(uid, diary_id);
        self.client
            .create_document(&collection, snap_id.as_str(), snap_record_to_fields(record))
            .await?;

        info!(uid = %uid, diary_id = %diary_id, snap_id = %snap_id, "Created snap record");
        Ok(())
    }
}

#[async_trait]
impl SnapStore for SnapRepository {
    async fn create_snap(
        &self,
        uid: &str,
        diary_id: &DiaryId,
        snap_id: &SnapId,
        record: &SnapRecord,
    ) -> FirestoreResult<()> {
        self.create(uid, diary_id, snap_id, record).await
    }
}

pub(crate) fn snap_record_to_fields(record: &SnapRecord) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("date".to_string(), record.date.to_string().to_firestore_value());
    fields.insert("mediaLength".to_string(), record.media_length_sec.to_firestore_value());
    fields.insert("videoUrl".to_string(), record.video_url.to_firestore_value());
    fields.insert("thumbnailUrl".to_string(), record.thumbnail_url.to_firestore_value());
    fields.insert("isThumbnailDark".to_string(), record.is_thumbnail_dark.to_firestore_value());
    fields
}

// =============================================================================
// Profiles
// =============================================================================

/// Repository for user profile documents.
#[derive(Clone)]
pub struct ProfileRepository {
    client: FirestoreClient,
}

impl ProfileRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Merge `lastSnapLength` into the profile, creating the document if needed.
    pub async fn set_last_snap_length(&self, uid: &str, length_sec: f64) -> FirestoreResult<()> {
        self.client
            .with_retry("set_last_snap_length", || {
                let mut fields = HashMap::new();
                fields.insert("lastSnapLength".to_string(), length_sec.to_firestore_value());
                self.client.update_document(
                    USERS_COLLECTION,
                    uid,
                    fields,
                    Some(vec!["lastSnapLength".to_string()]),
                )
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for ProfileRepository {
    async fn set_last_snap_length(&self, uid: &str, length_sec: f64) -> FirestoreResult<()> {
        ProfileRepository::set_last_snap_length(self, uid, length_sec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{emulator_client, DOCS};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record() -> SnapRecord {
        SnapRecord {
            id: Some(SnapId::from("s1")),
            date: "2024-03-09".parse().unwrap(),
            media_length_sec: 5.0,
            video_url: "https://m/v.webm".into(),
            thumbnail_url: "https://m/t.png".into(),
            is_thumbnail_dark: false,
        }
    }

    #[test]
    fn test_snap_record_fields() {
        let fields = snap_record_to_fields(&record());
        assert_eq!(fields.len(), 5);
        assert_eq!(fields["date"], Value::StringValue("2024-03-09".into()));
        assert_eq!(fields["mediaLength"], Value::DoubleValue(5.0));
        assert_eq!(fields["isThumbnailDark"], Value::BooleanValue(false));
    }

    #[tokio::test]
    async fn test_get_upload_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/uploadTokens/tok1", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/test-project/databases/(default)/documents/uploadTokens/tok1",
                "fields": {
                    "owner": {"stringValue": "uid-1"},
                    "validUntil": {"timestampValue": "2030-01-01T00:00:00Z"}
                }
            })))
            .mount(&server)
            .await;

        let repo = UploadTokenRepository::new(emulator_client(&server).await);
        let session = repo.get(&UploadToken::from("tok1")).await.unwrap().unwrap();
        assert_eq!(session.owner, "uid-1");
        assert_eq!(session.token, Some(UploadToken::from("tok1")));
        assert!(!session.is_expired(Utc::now()));
    }

    #[tokio::test]
    async fn test_malformed_upload_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "fields": {"owner": {"stringValue": "uid-1"}}
            })))
            .mount(&server)
            .await;

        let repo = UploadTokenRepository::new(emulator_client(&server).await);
        let err = repo.get(&UploadToken::from("tok1")).await.unwrap_err();
        assert!(matches!(err, FirestoreError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_get_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let repo = UploadTokenRepository::new(emulator_client(&server).await);
        assert!(repo.get(&UploadToken::from("tok1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_snap_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{}/users/u1/diaries/d1/snaps", DOCS)))
            .and(query_param("documentId", "s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/test-project/databases/(default)/documents/users/u1/diaries/d1/snaps/s1",
                "fields": {}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let repo = SnapRepository::new(emulator_client(&server).await);
        repo.create("u1", &DiaryId::from("d1"), &SnapId::from("s1"), &record())
            .await
            .unwrap();
    }
}
