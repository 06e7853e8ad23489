//! In-memory implementation of the store.
//!
//! Same semantics as Postgres with everything behind one RwLock, which is
//! also what makes the composite operations atomic. Used by the test suite
//! and usable as a throwaway local backend.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::{DrmError, Result};
use crate::models::content_key::ContentKey;
use crate::models::device::DeviceRegistration;
use crate::models::license::License;
use crate::models::session::Session;
use crate::store::{ClosedSession, DrmStore, RevocationSweep};

#[derive(Default)]
struct Inner {
    content_keys: Vec<ContentKey>,
    licenses: Vec<License>,
    sessions: Vec<Session>,
    devices: HashMap<Uuid, Vec<DeviceRegistration>>,
}

/// In-memory store. All data is lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| DrmError::Internal("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| DrmError::Internal("store lock poisoned".to_string()))
    }
}

fn token_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

#[async_trait]
impl DrmStore for MemoryStore {
    async fn insert_content_key(&self, key: &ContentKey) -> Result<()> {
        let mut inner = self.write()?;
        if key.active
            && inner
                .content_keys
                .iter()
                .any(|k| k.object_id == key.object_id && k.active)
        {
            return Err(DrmError::KeyConflict);
        }
        inner.content_keys.push(key.clone());
        Ok(())
    }

    async fn active_content_key(&self, object_id: Uuid) -> Result<Option<ContentKey>> {
        let inner = self.read()?;
        Ok(inner
            .content_keys
            .iter()
            .find(|k| k.object_id == object_id && k.active)
            .cloned())
    }

    async fn latest_content_key(&self, object_id: Uuid) -> Result<Option<ContentKey>> {
        let inner = self.read()?;
        Ok(inner
            .content_keys
            .iter()
            .filter(|k| k.object_id == object_id)
            .max_by_key(|k| k.created_at)
            .cloned())
    }

    async fn deactivate_content_key(&self, object_id: Uuid) -> Result<bool> {
        let mut inner = self.write()?;
        let mut changed = false;
        for key in inner
            .content_keys
            .iter_mut()
            .filter(|k| k.object_id == object_id && k.active)
        {
            key.active = false;
            changed = true;
        }
        Ok(changed)
    }

    async fn register_device(
        &self,
        user_id: Uuid,
        device_id: &str,
        max_devices: i64,
    ) -> Result<()> {
        let mut inner = self.write()?;
        let now = Utc::now();
        let devices = inner.devices.entry(user_id).or_default();

        if let Some(existing) = devices.iter_mut().find(|d| d.device_id == device_id) {
            existing.last_seen = now;
            return Ok(());
        }

        if devices.len() as i64 >= max_devices {
            return Err(DrmError::DeviceLimitExceeded);
        }

        devices.push(DeviceRegistration {
            user_id,
            device_id: device_id.to_string(),
            registered_at: now,
            last_seen: now,
        });
        Ok(())
    }

    async fn create_license_with_session(
        &self,
        license: &License,
        session_token: &str,
    ) -> Result<Session> {
        let mut inner = self.write()?;
        let now = Utc::now();
        inner.licenses.push(license.clone());

        if let Some(existing) = inner
            .sessions
            .iter_mut()
            .find(|s| s.license_id == license.id && s.device_id == license.device_id)
        {
            existing.last_heartbeat = now;
            return Ok(existing.clone());
        }

        let session = Session {
            id: Uuid::new_v4(),
            license_id: license.id,
            token: session_token.to_string(),
            device_id: license.device_id.clone(),
            started_at: now,
            last_heartbeat: now,
            active: true,
        };
        inner.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_license(&self, license_id: Uuid) -> Result<Option<License>> {
        let inner = self.read()?;
        Ok(inner.licenses.iter().find(|l| l.id == license_id).cloned())
    }

    async fn find_session_by_token(&self, token: &str) -> Result<Option<Session>> {
        let inner = self.read()?;
        Ok(inner
            .sessions
            .iter()
            .find(|s| token_eq(&s.token, token))
            .cloned())
    }

    async fn touch_session(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.write()?;
        if let Some(session) = inner.sessions.iter_mut().find(|s| s.id == session_id) {
            session.last_heartbeat = at;
        }
        Ok(())
    }

    async fn deactivate_session(&self, session_id: Uuid) -> Result<()> {
        let mut inner = self.write()?;
        if let Some(session) = inner.sessions.iter_mut().find(|s| s.id == session_id) {
            session.active = false;
        }
        Ok(())
    }

    async fn revoke_object(&self, object_id: Uuid) -> Result<RevocationSweep> {
        let mut inner = self.write()?;

        let mut licenses_revoked = 0u64;
        let mut owner_by_license: HashMap<Uuid, Uuid> = HashMap::new();
        for license in inner.licenses.iter_mut().filter(|l| l.object_id == object_id) {
            owner_by_license.insert(license.id, license.user_id);
            if !license.revoked {
                license.revoked = true;
                licenses_revoked += 1;
            }
        }

        let mut key_deactivated = false;
        for key in inner
            .content_keys
            .iter_mut()
            .filter(|k| k.object_id == object_id && k.active)
        {
            key.active = false;
            key_deactivated = true;
        }

        let mut closed_sessions = Vec::new();
        for session in inner
            .sessions
            .iter_mut()
            .filter(|s| s.active && owner_by_license.contains_key(&s.license_id))
        {
            session.active = false;
            closed_sessions.push(ClosedSession {
                user_id: owner_by_license[&session.license_id],
                license_id: session.license_id,
                session_token: session.token.clone(),
            });
        }

        Ok(RevocationSweep {
            licenses_revoked,
            key_deactivated,
            closed_sessions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key_row(object_id: Uuid, active: bool) -> ContentKey {
        ContentKey {
            id: Uuid::new_v4(),
            object_id,
            encrypted_key: "d2hhdGV2ZXI=".to_string(),
            storage_ref: None,
            checksum: None,
            created_at: Utc::now(),
            active,
        }
    }

    fn license_row(object_id: Uuid, user_id: Uuid, device_id: &str) -> License {
        let now = Utc::now();
        License {
            id: Uuid::new_v4(),
            object_id,
            user_id,
            device_id: device_id.to_string(),
            issued_at: now,
            expires_at: now + Duration::hours(24),
            wrapped_key: "wrapped".to_string(),
            revoked: false,
        }
    }

    #[tokio::test]
    async fn at_most_one_active_key_per_object() {
        let store = MemoryStore::new();
        let object = Uuid::new_v4();

        store.insert_content_key(&key_row(object, true)).await.unwrap();
        let err = store.insert_content_key(&key_row(object, true)).await.unwrap_err();
        assert!(matches!(err, DrmError::KeyConflict));

        // a retired row is always insertable
        store.insert_content_key(&key_row(object, false)).await.unwrap();

        store.deactivate_content_key(object).await.unwrap();
        store.insert_content_key(&key_row(object, true)).await.unwrap();
    }

    #[tokio::test]
    async fn device_quota_counts_distinct_devices_only() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();

        store.register_device(user, "dev-a", 2).await.unwrap();
        store.register_device(user, "dev-b", 2).await.unwrap();
        // repeats touch, never count
        store.register_device(user, "dev-a", 2).await.unwrap();

        let err = store.register_device(user, "dev-c", 2).await.unwrap_err();
        assert!(matches!(err, DrmError::DeviceLimitExceeded));
    }

    #[tokio::test]
    async fn session_reopen_touches_instead_of_inserting() {
        let store = MemoryStore::new();
        let license = license_row(Uuid::new_v4(), Uuid::new_v4(), "dev-a");

        let first = store
            .create_license_with_session(&license, "token-1")
            .await
            .unwrap();
        let second = store
            .create_license_with_session(&license, "token-2")
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.token, "token-1");
        assert!(second.last_heartbeat >= first.last_heartbeat);
    }

    #[tokio::test]
    async fn revocation_sweep_is_idempotent() {
        let store = MemoryStore::new();
        let object = Uuid::new_v4();
        let user = Uuid::new_v4();

        store.insert_content_key(&key_row(object, true)).await.unwrap();
        let license = license_row(object, user, "dev-a");
        store
            .create_license_with_session(&license, "token-1")
            .await
            .unwrap();

        let sweep = store.revoke_object(object).await.unwrap();
        assert_eq!(sweep.licenses_revoked, 1);
        assert!(sweep.key_deactivated);
        assert_eq!(sweep.closed_sessions.len(), 1);
        assert_eq!(sweep.closed_sessions[0].user_id, user);

        let again = store.revoke_object(object).await.unwrap();
        assert_eq!(again.licenses_revoked, 0);
        assert!(!again.key_deactivated);
        assert!(again.closed_sessions.is_empty());
    }
}
