//! Session tracking. ACTIVE --heartbeat--> ACTIVE while the license holds;
//! any revocation discovery moves the session to its terminal INACTIVE state.

use chrono::Utc;

use crate::error::{DrmError, Result};
use crate::store::DrmStore;

/// Processes a heartbeat for a session token.
///
/// This is the authoritative path by which a client learns about
/// mid-session revocation; the push channel is only a latency optimization.
/// Once the backing license is revoked, every heartbeat on the token keeps
/// failing with `LicenseRevoked` — the terminal behavior is deliberately
/// consistent rather than degrading to `SessionNotFound` on the second call.
pub async fn heartbeat(store: &dyn DrmStore, token: &str) -> Result<()> {
    let session = store
        .find_session_by_token(token)
        .await?
        .ok_or(DrmError::SessionNotFound)?;

    let license = match store.find_license(session.license_id).await? {
        Some(license) => license,
        None => {
            tracing::error!(
                "💥 Session {} references missing license {}",
                session.id,
                session.license_id
            );
            return Err(DrmError::LicenseNotFound);
        }
    };

    if license.revoked {
        if session.active {
            store.deactivate_session(session.id).await?;
            tracing::info!(
                "🛑 Session {} closed on heartbeat: license {} is revoked",
                session.id,
                license.id
            );
        }
        return Err(DrmError::LicenseRevoked);
    }

    // a live license with an inactive session is a stale handle
    if !session.active {
        return Err(DrmError::SessionNotFound);
    }

    store.touch_session(session.id, Utc::now()).await?;
    Ok(())
}
