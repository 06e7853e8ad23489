//! Administrative operations: first protection, revocation, rotation.
//! Role checks happen upstream at the identity gateway.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::services::{keys, revocation};
use crate::state::AppState;

/// The response payload for protect and rotate.
#[derive(Serialize)]
pub struct KeyResponse {
    pub key_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Mints the first content key for an object (its first protection event).
#[axum::debug_handler]
pub async fn protect_object(
    State(state): State<AppState>,
    Path(object_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let key = keys::create_initial_key(state.store.as_ref(), &state.master, object_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(KeyResponse {
            key_id: key.id,
            created_at: key.created_at,
        }),
    ))
}

/// Revokes every license and session for an object. Idempotent.
#[axum::debug_handler]
pub async fn revoke_object(
    State(state): State<AppState>,
    Path(object_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    revocation::revoke(state.store.as_ref(), state.publisher.as_ref(), object_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Rotates a revoked object onto a fresh key and re-encrypted content.
#[axum::debug_handler]
pub async fn rotate_object(
    State(state): State<AppState>,
    Path(object_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let key = keys::rotate_after_revoke(
        state.store.as_ref(),
        state.storage.as_ref(),
        &state.master,
        object_id,
    )
    .await?;

    Ok((
        StatusCode::OK,
        Json(KeyResponse {
            key_id: key.id,
            created_at: key.created_at,
        }),
    ))
}
