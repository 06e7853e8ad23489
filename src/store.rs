//! Store trait: the relational state behind content keys, licenses,
//! sessions and device registrations.
//!
//! Implementations are Postgres (primary) and in-memory (tests and local
//! development). Composite operations — license+session issuance, device
//! registration, the revocation sweep — are atomic in both: one transaction
//! in Postgres, one lock hold in memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::content_key::ContentKey;
use crate::models::license::License;
use crate::models::session::Session;

pub mod memory;
pub mod postgres;

/// A session closed by a revocation sweep, with the data the push channel
/// needs.
#[derive(Debug, Clone)]
pub struct ClosedSession {
    pub user_id: Uuid,
    pub license_id: Uuid,
    pub session_token: String,
}

/// What a revocation sweep actually flipped.
#[derive(Debug, Clone)]
pub struct RevocationSweep {
    /// Licenses moved to revoked by this sweep.
    pub licenses_revoked: u64,
    /// Whether an active content key was deactivated.
    pub key_deactivated: bool,
    /// Sessions moved to inactive by this sweep.
    pub closed_sessions: Vec<ClosedSession>,
}

#[async_trait]
pub trait DrmStore: Send + Sync {
    /// Inserts a content key row.
    ///
    /// Fails with `KeyConflict` when the row is active and an active row
    /// already exists for the object — the single-active invariant lives
    /// here, not in read-then-write callers.
    async fn insert_content_key(&self, key: &ContentKey) -> Result<()>;

    /// The active content key for an object, if any.
    async fn active_content_key(&self, object_id: Uuid) -> Result<Option<ContentKey>>;

    /// The newest content key row for an object regardless of state.
    /// Rotation uses this to find the retiring blob.
    async fn latest_content_key(&self, object_id: Uuid) -> Result<Option<ContentKey>>;

    /// Deactivates the active content key. Returns whether a row changed;
    /// a no-op when none is active.
    async fn deactivate_content_key(&self, object_id: Uuid) -> Result<bool>;

    /// Registers a device for a user, or touches it if already registered.
    ///
    /// Serialized per user; fails with `DeviceLimitExceeded` when the device
    /// is new and the user already holds `max_devices` registrations.
    async fn register_device(&self, user_id: Uuid, device_id: &str, max_devices: i64)
        -> Result<()>;

    /// Persists a license and opens (or touches) its session, atomically.
    ///
    /// A session already active for `(license_id, device_id)` has its
    /// `last_heartbeat` updated and keeps its original token.
    async fn create_license_with_session(
        &self,
        license: &License,
        session_token: &str,
    ) -> Result<Session>;

    /// Looks up a license row by id.
    async fn find_license(&self, license_id: Uuid) -> Result<Option<License>>;

    /// Looks up a session by its opaque token.
    async fn find_session_by_token(&self, token: &str) -> Result<Option<Session>>;

    /// Records a heartbeat on a session.
    async fn touch_session(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Moves a session to its terminal inactive state.
    async fn deactivate_session(&self, session_id: Uuid) -> Result<()>;

    /// The revocation sweep: revoke every non-revoked license for the
    /// object, deactivate its content key, deactivate every active session
    /// under those licenses — all in one transaction. Idempotent.
    async fn revoke_object(&self, object_id: Uuid) -> Result<RevocationSweep>;
}
