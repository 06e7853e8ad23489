use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::collab::{EventPublisher, UserEvent};
use crate::error::{DrmError, Result};

/// Redis pub/sub publisher for per-user real-time channels.
///
/// The main backend subscribes on `drm:user:{uuid}` and relays to connected
/// clients; this side only fires and forgets.
#[derive(Clone)]
pub struct RedisPublisher {
    conn: ConnectionManager,
}

impl RedisPublisher {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl EventPublisher for RedisPublisher {
    async fn publish_to_user(&self, user_id: Uuid, event: &UserEvent) -> Result<()> {
        let payload = sonic_rs::to_string(event)
            .map_err(|e| DrmError::Internal(format!("event serialization failed: {}", e)))?;

        let mut conn = self.conn.clone();
        let _receivers: i64 = conn.publish(format!("drm:user:{}", user_id), payload).await?;
        Ok(())
    }
}
