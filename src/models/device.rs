use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A device registered to a user.
///
/// The per-user set is bounded by the configured quota across all protected
/// objects; a repeat registration touches `last_seen` and never counts twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRegistration {
    pub user_id: Uuid,
    pub device_id: String,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}
