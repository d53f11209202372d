//! The `createSnap` callable.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use snap_models::{CreateSnapInput, SnapSummary};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Callable request envelope: `{"data": ...}`.
#[derive(Debug, Deserialize)]
pub struct CallableRequest<T> {
    pub data: T,
}

/// Callable success envelope: `{"result": ...}`.
#[derive(Debug, Serialize)]
pub struct CallableResponse<T> {
    pub result: T,
}

/// Parse a callable body into the snap request.
pub fn parse_create_snap(body: &[u8]) -> ApiResult<CreateSnapInput> {
    let envelope: CallableRequest<serde_json::Value> = serde_json::from_slice(body)
        .map_err(|_| ApiError::invalid_argument("Request body must be a JSON object with a data field"))?;

    serde_json::from_value(envelope.data)
        .map_err(|e| ApiError::invalid_argument(format!("Invalid createSnap arguments: {}", e)))
}

/// POST /createSnap
pub async fn create_snap(
    State(state): State<AppState>,
    user: AuthUser,
    body: Bytes,
) -> ApiResult<Json<CallableResponse<SnapSummary>>> {
    let input = parse_create_snap(&body)?;

    info!(
        uid = %user.uid,
        diary_id = %input.diary_id,
        start_ms = input.media_edit_options.start_ms,
        length = input.media_edit_options.length_sec,
        "createSnap called"
    );

    let summary = state.pipeline.create_snap(&user.uid, input).await?;

    Ok(Json(CallableResponse { result: summary }))
}
