//! Content-key lifecycle: one active key per protected object, deactivation
//! on revoke, fresh-key generation plus content re-encryption on rotation.

use chrono::Utc;
use uuid::Uuid;

use crate::collab::ObjectStorage;
use crate::crypto::envelope::{self, MasterSecret};
use crate::error::{DrmError, Result};
use crate::models::content_key::ContentKey;
use crate::store::DrmStore;

/// The active content key for an object.
///
/// `KeyNotFound` when the object was never protected or is revoked and not
/// yet rotated.
pub async fn get_active_key(store: &dyn DrmStore, object_id: Uuid) -> Result<ContentKey> {
    store
        .active_content_key(object_id)
        .await?
        .ok_or(DrmError::KeyNotFound)
}

/// Mints the first content key for an object.
///
/// Called once per object's first protection event. Not idempotent: a second
/// call while a key is active fails with `KeyConflict` rather than quietly
/// breaking the single-active invariant.
pub async fn create_initial_key(
    store: &dyn DrmStore,
    master: &MasterSecret,
    object_id: Uuid,
) -> Result<ContentKey> {
    let content_key = envelope::generate_content_key();

    let row = ContentKey {
        id: Uuid::new_v4(),
        object_id,
        encrypted_key: envelope::encrypt_key(master, &content_key)?,
        storage_ref: None,
        checksum: None,
        created_at: Utc::now(),
        active: true,
    };

    store.insert_content_key(&row).await?;
    tracing::info!("🔑 Content key {} created for object {}", row.id, object_id);
    Ok(row)
}

/// Deactivates an object's active content key; no-op when none is active.
///
/// Revocation runs this inside its transactional sweep; the standalone form
/// exists for administrative use.
pub async fn deactivate_key(store: &dyn DrmStore, object_id: Uuid) -> Result<bool> {
    let changed = store.deactivate_content_key(object_id).await?;
    if changed {
        tracing::info!("🔒 Content key deactivated for object {}", object_id);
    }
    Ok(changed)
}

/// Rotates a revoked object onto a fresh key and re-encrypted content.
///
/// Preconditions: the object has key history but no active key. The write
/// order is deliberate — new blob, then key row, then old-blob removal — so
/// a crash mid-way leaves the object revoked rather than pointing an active
/// key at a missing file.
pub async fn rotate_after_revoke(
    store: &dyn DrmStore,
    storage: &dyn ObjectStorage,
    master: &MasterSecret,
    object_id: Uuid,
) -> Result<ContentKey> {
    if store.active_content_key(object_id).await?.is_some() {
        return Err(DrmError::KeyConflict);
    }
    let previous = store
        .latest_content_key(object_id)
        .await?
        .ok_or(DrmError::KeyNotFound)?;

    let raw = storage.load_raw_bytes(object_id).await?;

    let content_key = envelope::generate_content_key();
    let blob = envelope::encrypt_content(&raw, &content_key)?;
    let checksum = blake3::hash(&blob).to_hex().to_string();

    let storage_ref = storage.store_encrypted_bytes(object_id, &blob).await?;

    let row = ContentKey {
        id: Uuid::new_v4(),
        object_id,
        encrypted_key: envelope::encrypt_key(master, &content_key)?,
        storage_ref: Some(storage_ref.clone()),
        checksum: Some(checksum),
        created_at: Utc::now(),
        active: true,
    };

    if let Err(e) = store.insert_content_key(&row).await {
        // the fresh blob is unreachable without its key row; best-effort
        // cleanup before surfacing the failure
        if let Err(cleanup) = storage.remove_encrypted_bytes(object_id, &storage_ref).await {
            tracing::warn!("🧹 Could not remove orphaned blob {}: {}", storage_ref, cleanup);
        }
        return Err(e);
    }

    if let Some(old_ref) = previous.storage_ref {
        if let Err(e) = storage.remove_encrypted_bytes(object_id, &old_ref).await {
            tracing::warn!("🧹 Could not retire old blob {}: {}", old_ref, e);
        }
    }

    tracing::info!(
        "♻️ Object {} rotated onto content key {} ({})",
        object_id,
        row.id,
        storage_ref
    );
    Ok(row)
}
