use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A live viewing session tied to a license.
///
/// One active session per (license, device); re-opening the pair touches
/// `last_heartbeat` instead of inserting. INACTIVE is terminal — recovery
/// requires a brand-new license and session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub license_id: Uuid,
    /// Opaque unguessable handle presented on every heartbeat.
    pub token: String,
    pub device_id: String,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub active: bool,
}
