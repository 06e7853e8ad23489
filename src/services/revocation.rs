//! Revocation: one transactional sweep over licenses, key and sessions,
//! followed by best-effort notification of live clients.

use std::time::Duration;

use uuid::Uuid;

use crate::collab::{EventPublisher, UserEvent};
use crate::error::Result;
use crate::store::{DrmStore, RevocationSweep};

/// Upper bound on each push attempt; the sweep has already committed and
/// must never wait on a slow channel.
const PUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Revokes every license and session for a protected object and deactivates
/// its content key.
///
/// Idempotent: a second call sweeps nothing and notifies nobody. The pushes
/// are fire-and-forget — heartbeat remains the enforcement mechanism.
pub async fn revoke(
    store: &dyn DrmStore,
    publisher: &dyn EventPublisher,
    object_id: Uuid,
) -> Result<RevocationSweep> {
    let sweep = store.revoke_object(object_id).await?;

    tracing::info!(
        "🚫 Object {} revoked: {} licenses revoked, {} sessions closed, key deactivated: {}",
        object_id,
        sweep.licenses_revoked,
        sweep.closed_sessions.len(),
        sweep.key_deactivated
    );

    for closed in &sweep.closed_sessions {
        let event = UserEvent::revoked(object_id, closed.session_token.clone());
        match tokio::time::timeout(
            PUSH_TIMEOUT,
            publisher.publish_to_user(closed.user_id, &event),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    "📣 Revocation push to user {} (license {}) failed: {}",
                    closed.user_id,
                    closed.license_id,
                    e
                );
            }
            Err(_) => {
                tracing::warn!(
                    "📣 Revocation push to user {} (license {}) timed out",
                    closed.user_id,
                    closed.license_id
                );
            }
        }
    }

    Ok(sweep)
}
