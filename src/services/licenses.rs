//! License issuance: the single entry point turning "user wants object X on
//! device D" into device-bound key material plus a session handle.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::collab::AccessOracle;
use crate::config::Config;
use crate::crypto::aes;
use crate::crypto::device::{self, DeviceProfile};
use crate::crypto::envelope::{self, MasterSecret};
use crate::error::{DrmError, Result};
use crate::models::license::License;
use crate::models::media::MediaKind;
use crate::services::keys;
use crate::store::DrmStore;

/// Issuance policy knobs, loaded once from configuration.
#[derive(Debug, Clone, Copy)]
pub struct LicensePolicy {
    /// License validity window.
    pub ttl: Duration,
    /// Maximum concurrent devices per user.
    pub max_devices: i64,
}

impl LicensePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ttl: Duration::hours(config.license_ttl_hours),
            max_devices: config.max_devices_per_user,
        }
    }
}

/// A license request, identity resolved upstream.
#[derive(Debug)]
pub struct IssueRequest {
    pub object_id: Uuid,
    pub user_id: Uuid,
    pub device_id: String,
    pub device_public_key_pem: String,
    pub profile: DeviceProfile,
}

/// What the caller gets back. The unwrapped content key never appears here.
#[derive(Debug, Serialize)]
pub struct IssuedLicense {
    pub license_id: Uuid,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
    pub wrapped_key: String,
    pub content_type: &'static str,
}

/// Issues a license and opens its session.
///
/// The precondition chain short-circuits with a distinct failure at every
/// step: access oracle, device quota, active key, unwrap, device wrap.
/// Each issuance is independent — re-issuing for the same user/device/object
/// creates a new license row with a new token.
pub async fn issue_license(
    store: &dyn DrmStore,
    access: &dyn AccessOracle,
    master: &MasterSecret,
    policy: &LicensePolicy,
    req: IssueRequest,
) -> Result<IssuedLicense> {
    if !access.has_valid_access(req.object_id, req.user_id).await? {
        tracing::warn!(
            "⛔ User {} has no valid access to object {}",
            req.user_id,
            req.object_id
        );
        return Err(DrmError::AccessDenied);
    }

    store
        .register_device(req.user_id, &req.device_id, policy.max_devices)
        .await?;

    let key_row = keys::get_active_key(store, req.object_id).await?;
    let content_key = envelope::decrypt_key(master, &key_row.encrypted_key)?;

    let wrapped_key =
        device::wrap_key_for_device(&content_key, &req.device_public_key_pem, req.profile)?;

    let now = Utc::now();
    let license = License {
        id: Uuid::new_v4(),
        object_id: req.object_id,
        user_id: req.user_id,
        device_id: req.device_id,
        issued_at: now,
        expires_at: now + policy.ttl,
        wrapped_key: wrapped_key.clone(),
        revoked: false,
    };

    let token = aes::generate_token();
    let session = store.create_license_with_session(&license, &token).await?;

    tracing::info!(
        "📄 License {} issued to user {} on device {} (expires {})",
        license.id,
        license.user_id,
        license.device_id,
        license.expires_at
    );

    let content_type = MediaKind::from_storage_ref(key_row.storage_ref.as_deref().unwrap_or(""))
        .content_type();

    Ok(IssuedLicense {
        license_id: license.id,
        session_token: session.token,
        expires_at: license.expires_at,
        wrapped_key,
        content_type,
    })
}
