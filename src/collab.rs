//! Collaborator seams: the pieces of the wider library backend the DRM core
//! consumes but does not own — the access-approval oracle, durable object
//! storage, and the best-effort real-time push channel.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;

pub mod access;
pub mod publish;
pub mod storage;

/// An event pushed to a user's real-time channel.
#[derive(Debug, Clone, Serialize)]
pub struct UserEvent {
    pub action: String,
    pub object_id: Uuid,
    pub session_token: String,
}

impl UserEvent {
    /// The revocation notice sent to live clients.
    pub fn revoked(object_id: Uuid, session_token: String) -> Self {
        Self {
            action: "REVOKED".to_string(),
            object_id,
            session_token,
        }
    }
}

/// The access-approval oracle owned by the loan workflow.
///
/// Checked fresh on every license request, never cached here.
#[async_trait]
pub trait AccessOracle: Send + Sync {
    async fn has_valid_access(&self, object_id: Uuid, user_id: Uuid) -> Result<bool>;
}

/// Durable storage for protected object bytes.
///
/// Owned by the upload collaborator; the DRM core only touches it during
/// rotation (re-encrypt, swap paths, retire the old blob).
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Loads the staged plaintext bytes of a protected object.
    async fn load_raw_bytes(&self, object_id: Uuid) -> Result<Vec<u8>>;

    /// Writes an encrypted blob under a fresh path and returns its
    /// storage reference.
    async fn store_encrypted_bytes(&self, object_id: Uuid, bytes: &[u8]) -> Result<String>;

    /// Removes a retired encrypted blob.
    async fn remove_encrypted_bytes(&self, object_id: Uuid, storage_ref: &str) -> Result<()>;
}

/// Best-effort real-time push channel to users.
///
/// Delivery failures are the caller's problem to log, never to retry or
/// roll back over.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_to_user(&self, user_id: Uuid, event: &UserEvent) -> Result<()>;
}
