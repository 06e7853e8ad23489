use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::DrmError;

/// The caller's identity, established by the upstream identity gateway and
/// carried in the `X-User-Id` header. Transport authentication itself
/// (token parsing, role checks) happens before requests reach this service.
pub struct CallerIdentity(pub Uuid);

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = DrmError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| DrmError::Validation("missing X-User-Id header".to_string()))?;

        let user_id = Uuid::parse_str(raw)
            .map_err(|_| DrmError::Validation("invalid X-User-Id header".to_string()))?;

        Ok(CallerIdentity(user_id))
    }
}
