use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use garde::Validate;
use serde::Deserialize;

use crate::error::{DrmError, Result};
use crate::services::sessions;
use crate::state::AppState;

/// The request payload for a session heartbeat.
#[derive(Debug, Deserialize, Validate)]
pub struct HeartbeatRequest {
    #[garde(length(min = 1, max = 128))]
    pub session_token: String,
}

/// Records a heartbeat; 410 tells the client its license was revoked and it
/// must stop rendering the content.
#[axum::debug_handler]
pub async fn heartbeat(
    State(state): State<AppState>,
    Json(payload): Json<HeartbeatRequest>,
) -> Result<impl IntoResponse> {
    payload
        .validate()
        .map_err(|e| DrmError::Validation(e.to_string()))?;

    sessions::heartbeat(state.store.as_ref(), &payload.session_token).await?;
    Ok(StatusCode::NO_CONTENT)
}
