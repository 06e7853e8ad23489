use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A time-boxed grant binding a user and device to a wrapped content key.
///
/// Licenses are never updated in place: re-issuing for the same user and
/// device creates a new row. `revoked` flips true only through revocation
/// and never back — a revoked object must go through rotation before it can
/// be served again. `expires_at` is advisory and checked by the consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub id: Uuid,
    pub object_id: Uuid,
    pub user_id: Uuid,
    pub device_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Content key wrapped for this device's public key (base64).
    pub wrapped_key: String,
    pub revoked: bool,
}
