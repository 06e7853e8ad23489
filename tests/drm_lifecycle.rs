//! End-to-end lifecycle tests for the DRM core, driven over the in-memory
//! store with local stand-ins for the collaborator seams.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey};
use sha2::Sha256;
use uuid::Uuid;

use keyward::collab::{AccessOracle, EventPublisher, ObjectStorage, UserEvent};
use keyward::crypto::device::DeviceProfile;
use keyward::crypto::envelope::{self, MasterSecret};
use keyward::error::{DrmError, Result};
use keyward::services::licenses::{self, IssueRequest, IssuedLicense, LicensePolicy};
use keyward::services::{keys, revocation, sessions};
use keyward::store::memory::MemoryStore;
use keyward::store::DrmStore;

struct TestDevice {
    private: RsaPrivateKey,
    spki_pem: String,
    pkcs1_pem: String,
}

// 2048-bit keygen is slow; one keypair serves every test.
static DEVICE: Lazy<TestDevice> = Lazy::new(|| {
    let mut rng = rand::rngs::OsRng;
    let private = RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let public = private.to_public_key();
    TestDevice {
        spki_pem: public.to_public_key_pem(LineEnding::LF).unwrap(),
        pkcs1_pem: public.to_pkcs1_pem(LineEnding::LF).unwrap(),
        private,
    }
});

struct AllowAll;

#[async_trait]
impl AccessOracle for AllowAll {
    async fn has_valid_access(&self, _object_id: Uuid, _user_id: Uuid) -> Result<bool> {
        Ok(true)
    }
}

struct DenyAll;

#[async_trait]
impl AccessOracle for DenyAll {
    async fn has_valid_access(&self, _object_id: Uuid, _user_id: Uuid) -> Result<bool> {
        Ok(false)
    }
}

#[derive(Default)]
struct MemObjectStorage {
    raw: Mutex<HashMap<Uuid, Vec<u8>>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemObjectStorage {
    fn stage_raw(&self, object_id: Uuid, bytes: &[u8]) {
        self.raw.lock().unwrap().insert(object_id, bytes.to_vec());
    }

    fn blob(&self, storage_ref: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(storage_ref).cloned()
    }
}

#[async_trait]
impl ObjectStorage for MemObjectStorage {
    async fn load_raw_bytes(&self, object_id: Uuid) -> Result<Vec<u8>> {
        self.raw
            .lock()
            .unwrap()
            .get(&object_id)
            .cloned()
            .ok_or_else(|| DrmError::Internal("no staged raw bytes".to_string()))
    }

    async fn store_encrypted_bytes(&self, object_id: Uuid, bytes: &[u8]) -> Result<String> {
        let storage_ref = format!("mem/{}/{}.bin", object_id, Uuid::new_v4());
        self.blobs
            .lock()
            .unwrap()
            .insert(storage_ref.clone(), bytes.to_vec());
        Ok(storage_ref)
    }

    async fn remove_encrypted_bytes(&self, _object_id: Uuid, storage_ref: &str) -> Result<()> {
        self.blobs.lock().unwrap().remove(storage_ref);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingPublisher {
    events: Mutex<Vec<(Uuid, UserEvent)>>,
}

impl RecordingPublisher {
    fn recorded(&self) -> Vec<(Uuid, UserEvent)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish_to_user(&self, user_id: Uuid, event: &UserEvent) -> Result<()> {
        self.events.lock().unwrap().push((user_id, event.clone()));
        Ok(())
    }
}

fn master() -> MasterSecret {
    MasterSecret::new(&[7u8; 32]).unwrap()
}

fn policy() -> LicensePolicy {
    LicensePolicy {
        ttl: Duration::hours(24),
        max_devices: 2,
    }
}

fn issue_request(object_id: Uuid, user_id: Uuid, device_id: &str) -> IssueRequest {
    IssueRequest {
        object_id,
        user_id,
        device_id: device_id.to_string(),
        device_public_key_pem: DEVICE.spki_pem.clone(),
        profile: DeviceProfile::Generic,
    }
}

async fn issue(store: &MemoryStore, object_id: Uuid, user_id: Uuid, device_id: &str)
    -> Result<IssuedLicense> {
    licenses::issue_license(
        store,
        &AllowAll,
        &master(),
        &policy(),
        issue_request(object_id, user_id, device_id),
    )
    .await
}

fn unwrap_oaep(wrapped_key: &str) -> String {
    let ciphertext = BASE64.decode(wrapped_key).unwrap();
    let plaintext = DEVICE
        .private
        .decrypt(Oaep::new::<Sha256>(), &ciphertext)
        .unwrap();
    String::from_utf8(plaintext).unwrap()
}

#[tokio::test]
async fn protect_issue_revoke_rotate_scenario() {
    let store = MemoryStore::new();
    let storage = MemObjectStorage::default();
    let publisher = RecordingPublisher::default();
    let object = Uuid::new_v4();
    let user = Uuid::new_v4();
    let raw_bytes = b"chapter one: it was a dark and stormy night".to_vec();
    storage.stage_raw(object, &raw_bytes);

    // first protection event succeeds exactly once
    keys::create_initial_key(&store, &master(), object).await.unwrap();
    let err = keys::create_initial_key(&store, &master(), object)
        .await
        .unwrap_err();
    assert!(matches!(err, DrmError::KeyConflict));

    // issuance yields a 24h license and an unwrappable key
    let issued = issue(&store, object, user, "dev-a").await.unwrap();
    let ttl = issued.expires_at - Utc::now();
    assert!(ttl > Duration::hours(23) && ttl <= Duration::hours(24));
    let content_key = unwrap_oaep(&issued.wrapped_key);
    assert_eq!(content_key.len(), 64); // hex-encoded 32 bytes

    // revoked objects cannot be licensed until rotation
    revocation::revoke(&store, &publisher, object).await.unwrap();
    let err = issue(&store, object, user, "dev-a").await.unwrap_err();
    assert!(matches!(err, DrmError::KeyNotFound));

    // rotation mints a fresh key and re-encrypts the content
    let rotated = keys::rotate_after_revoke(&store, &storage, &master(), object)
        .await
        .unwrap();
    let active = keys::get_active_key(&store, object).await.unwrap();
    assert_eq!(active.id, rotated.id);

    let issued = issue(&store, object, user, "dev-a").await.unwrap();
    let content_key = unwrap_oaep(&issued.wrapped_key);

    let blob = storage.blob(active.storage_ref.as_deref().unwrap()).unwrap();
    let plaintext = envelope::decrypt_content(&blob, &content_key).unwrap();
    assert_eq!(plaintext, raw_bytes);

    // the rotated blob's checksum is recorded
    assert_eq!(
        active.checksum.as_deref().unwrap(),
        blake3::hash(&blob).to_hex().to_string()
    );
}

#[tokio::test]
async fn issuance_fails_closed_without_access() {
    let store = MemoryStore::new();
    let object = Uuid::new_v4();
    keys::create_initial_key(&store, &master(), object).await.unwrap();

    let err = licenses::issue_license(
        &store,
        &DenyAll,
        &master(),
        &policy(),
        issue_request(object, Uuid::new_v4(), "dev-a"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DrmError::AccessDenied));
}

#[tokio::test]
async fn device_quota_spans_all_objects() {
    let store = MemoryStore::new();
    let user = Uuid::new_v4();
    let object_a = Uuid::new_v4();
    let object_b = Uuid::new_v4();
    keys::create_initial_key(&store, &master(), object_a).await.unwrap();
    keys::create_initial_key(&store, &master(), object_b).await.unwrap();

    issue(&store, object_a, user, "dev-a").await.unwrap();
    issue(&store, object_b, user, "dev-b").await.unwrap();

    // a third distinct device fails even on a different object
    let err = issue(&store, object_a, user, "dev-c").await.unwrap_err();
    assert!(matches!(err, DrmError::DeviceLimitExceeded));

    // a repeat of a registered device never counts as new
    issue(&store, object_b, user, "dev-a").await.unwrap();
}

#[tokio::test]
async fn heartbeat_is_the_authoritative_revocation_path() {
    let store = MemoryStore::new();
    let publisher = RecordingPublisher::default();
    let object = Uuid::new_v4();
    let user = Uuid::new_v4();
    keys::create_initial_key(&store, &master(), object).await.unwrap();

    let issued = issue(&store, object, user, "dev-a").await.unwrap();
    let token = issued.session_token;

    sessions::heartbeat(&store, &token).await.unwrap();
    sessions::heartbeat(&store, &token).await.unwrap();

    revocation::revoke(&store, &publisher, object).await.unwrap();

    // first heartbeat after revoke: LicenseRevoked, session closed
    let err = sessions::heartbeat(&store, &token).await.unwrap_err();
    assert!(matches!(err, DrmError::LicenseRevoked));
    let session = store.find_session_by_token(&token).await.unwrap().unwrap();
    assert!(!session.active);

    // terminal behavior is consistent: still LicenseRevoked
    let err = sessions::heartbeat(&store, &token).await.unwrap_err();
    assert!(matches!(err, DrmError::LicenseRevoked));

    // a forged token is simply unknown
    let err = sessions::heartbeat(&store, "no-such-token").await.unwrap_err();
    assert!(matches!(err, DrmError::SessionNotFound));
}

#[tokio::test]
async fn revocation_cascades_and_notifies_live_sessions() {
    let store = MemoryStore::new();
    let publisher = RecordingPublisher::default();
    let object = Uuid::new_v4();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    keys::create_initial_key(&store, &master(), object).await.unwrap();

    let lic_a = issue(&store, object, alice, "dev-a").await.unwrap();
    let lic_b = issue(&store, object, bob, "dev-b").await.unwrap();

    let sweep = revocation::revoke(&store, &publisher, object).await.unwrap();
    assert_eq!(sweep.licenses_revoked, 2);
    assert_eq!(sweep.closed_sessions.len(), 2);

    for id in [lic_a.license_id, lic_b.license_id] {
        let license = store.find_license(id).await.unwrap().unwrap();
        assert!(license.revoked);
    }
    for token in [&lic_a.session_token, &lic_b.session_token] {
        let session = store.find_session_by_token(token).await.unwrap().unwrap();
        assert!(!session.active);
    }
    let err = keys::get_active_key(&store, object).await.unwrap_err();
    assert!(matches!(err, DrmError::KeyNotFound));

    let events = publisher.recorded();
    assert_eq!(events.len(), 2);
    for (user_id, event) in &events {
        assert_eq!(event.action, "REVOKED");
        assert_eq!(event.object_id, object);
        let expected_token = if *user_id == alice {
            &lic_a.session_token
        } else {
            assert_eq!(*user_id, bob);
            &lic_b.session_token
        };
        assert_eq!(&event.session_token, expected_token);
    }

    // idempotent: a second revoke sweeps nothing and notifies nobody
    let sweep = revocation::revoke(&store, &publisher, object).await.unwrap();
    assert_eq!(sweep.licenses_revoked, 0);
    assert!(sweep.closed_sessions.is_empty());
    assert_eq!(publisher.recorded().len(), 2);
}

#[tokio::test]
async fn rotation_requires_a_revoked_object() {
    let store = MemoryStore::new();
    let storage = MemObjectStorage::default();
    let object = Uuid::new_v4();
    storage.stage_raw(object, b"content");

    // never protected: nothing to rotate
    let err = keys::rotate_after_revoke(&store, &storage, &master(), object)
        .await
        .unwrap_err();
    assert!(matches!(err, DrmError::KeyNotFound));

    // active key present: rotation is refused
    keys::create_initial_key(&store, &master(), object).await.unwrap();
    let err = keys::rotate_after_revoke(&store, &storage, &master(), object)
        .await
        .unwrap_err();
    assert!(matches!(err, DrmError::KeyConflict));
}

#[tokio::test]
async fn repeated_rotation_retires_the_previous_blob() {
    let store = MemoryStore::new();
    let storage = MemObjectStorage::default();
    let publisher = RecordingPublisher::default();
    let object = Uuid::new_v4();
    storage.stage_raw(object, b"the content");

    keys::create_initial_key(&store, &master(), object).await.unwrap();
    revocation::revoke(&store, &publisher, object).await.unwrap();
    let first = keys::rotate_after_revoke(&store, &storage, &master(), object)
        .await
        .unwrap();
    let first_ref = first.storage_ref.clone().unwrap();
    assert!(storage.blob(&first_ref).is_some());

    revocation::revoke(&store, &publisher, object).await.unwrap();
    let second = keys::rotate_after_revoke(&store, &storage, &master(), object)
        .await
        .unwrap();
    let second_ref = second.storage_ref.clone().unwrap();

    assert!(storage.blob(&first_ref).is_none(), "old blob must be retired");
    assert!(storage.blob(&second_ref).is_some());
}

#[tokio::test]
async fn standalone_key_deactivation_is_a_guarded_noop() {
    let store = MemoryStore::new();
    let object = Uuid::new_v4();

    // nothing active yet: a no-op, not an error
    assert!(!keys::deactivate_key(&store, object).await.unwrap());

    keys::create_initial_key(&store, &master(), object).await.unwrap();
    assert!(keys::deactivate_key(&store, object).await.unwrap());

    let err = keys::get_active_key(&store, object).await.unwrap_err();
    assert!(matches!(err, DrmError::KeyNotFound));
}

#[tokio::test]
async fn legacy_profile_wraps_for_constrained_clients() {
    let store = MemoryStore::new();
    let object = Uuid::new_v4();
    let user = Uuid::new_v4();
    keys::create_initial_key(&store, &master(), object).await.unwrap();

    let issued = licenses::issue_license(
        &store,
        &AllowAll,
        &master(),
        &policy(),
        IssueRequest {
            object_id: object,
            user_id: user,
            device_id: "dev-mobile".to_string(),
            device_public_key_pem: DEVICE.pkcs1_pem.clone(),
            profile: DeviceProfile::Legacy,
        },
    )
    .await
    .unwrap();

    let ciphertext = BASE64.decode(issued.wrapped_key).unwrap();
    let plaintext = DEVICE.private.decrypt(Pkcs1v15Encrypt, &ciphertext).unwrap();
    assert_eq!(String::from_utf8(plaintext).unwrap().len(), 64);
}

#[tokio::test]
async fn reissuing_creates_an_independent_license() {
    let store = MemoryStore::new();
    let object = Uuid::new_v4();
    let user = Uuid::new_v4();
    keys::create_initial_key(&store, &master(), object).await.unwrap();

    let first = issue(&store, object, user, "dev-a").await.unwrap();
    let second = issue(&store, object, user, "dev-a").await.unwrap();

    assert_ne!(first.license_id, second.license_id);
    assert_ne!(first.session_token, second.session_token);

    // both rows exist; neither was updated in place
    assert!(store.find_license(first.license_id).await.unwrap().is_some());
    assert!(store.find_license(second.license_id).await.unwrap().is_some());
}
