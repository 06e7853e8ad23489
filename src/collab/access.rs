use async_trait::async_trait;
use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::collab::AccessOracle;
use crate::error::Result;

/// Access oracle reading the lending workflow's `access_grants` table.
#[derive(Clone)]
pub struct PgAccessOracle {
    pool: Pool,
}

impl PgAccessOracle {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessOracle for PgAccessOracle {
    async fn has_valid_access(&self, object_id: Uuid, user_id: Uuid) -> Result<bool> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM access_grants
                    WHERE object_id = $1 AND user_id = $2
                      AND (expires_at IS NULL OR expires_at > NOW())
                )
                "#,
            )
            .await?;

        let row = client.query_one(&stmt, &[&object_id, &user_id]).await?;
        Ok(row.get(0))
    }
}
