use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use garde::Validate;
use serde::Deserialize;
use uuid::Uuid;

use crate::crypto::device::DeviceProfile;
use crate::error::{DrmError, Result};
use crate::handlers::identity::CallerIdentity;
use crate::services::licenses::{self, IssueRequest};
use crate::state::AppState;

/// The request payload for license issuance.
#[derive(Debug, Deserialize, Validate)]
pub struct IssueLicenseRequest {
    #[garde(skip)]
    pub object_id: Uuid,
    #[garde(length(min = 1, max = 128))]
    pub device_id: String,
    #[garde(length(min = 1, max = 8192))]
    pub device_public_key_pem: String,
    /// Which wrapping profile the client speaks; chosen explicitly, never
    /// inferred from the key bytes.
    #[garde(skip)]
    pub client: DeviceProfile,
}

/// Issues a license for a protected object to the calling user's device.
#[axum::debug_handler]
pub async fn issue_license(
    State(state): State<AppState>,
    CallerIdentity(user_id): CallerIdentity,
    Json(payload): Json<IssueLicenseRequest>,
) -> Result<impl IntoResponse> {
    payload
        .validate()
        .map_err(|e| DrmError::Validation(e.to_string()))?;

    tracing::debug!(
        "📥 License request: object {}, user {}, device {}",
        payload.object_id,
        user_id,
        payload.device_id
    );

    let issued = licenses::issue_license(
        state.store.as_ref(),
        state.access.as_ref(),
        &state.master,
        &state.policy,
        IssueRequest {
            object_id: payload.object_id,
            user_id,
            device_id: payload.device_id,
            device_public_key_pem: payload.device_public_key_pem,
            profile: payload.client,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(issued)))
}
