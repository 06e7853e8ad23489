use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A content key row.
///
/// `encrypted_key` holds the content key wrapped under the process master
/// secret (`base64(ciphertext || nonce)`) — never usable as-is. For a given
/// `object_id` at most one row has `active = true`; revocation deactivates
/// rows, rotation supersedes them, nothing is ever deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentKey {
    pub id: Uuid,
    /// The protected object (upload) this key encrypts.
    pub object_id: Uuid,
    /// Master-wrapped key material.
    pub encrypted_key: String,
    /// Storage reference of the encrypted blob this key produced; `None`
    /// until a rotation has written one.
    pub storage_ref: Option<String>,
    /// BLAKE3 hex digest of the encrypted blob, recorded at rotation.
    pub checksum: Option<String>,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}
