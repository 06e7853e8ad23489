//! Postgres implementation of the store.
//!
//! The single-active-key invariant is backed by a partial unique index on
//! `content_keys (object_id) WHERE active`; session upserts ride the
//! `(license_id, device_id)` unique constraint; device registration holds a
//! per-user advisory lock for the duration of its transaction. Statements go
//! through deadpool's per-connection prepared-statement cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{DrmError, Result};
use crate::models::content_key::ContentKey;
use crate::models::license::License;
use crate::models::session::Session;
use crate::store::{ClosedSession, DrmStore, RevocationSweep};

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn content_key_from_row(row: &Row) -> ContentKey {
    ContentKey {
        id: row.get("id"),
        object_id: row.get("object_id"),
        encrypted_key: row.get("encrypted_key"),
        storage_ref: row.get("storage_ref"),
        checksum: row.get("checksum"),
        created_at: row.get("created_at"),
        active: row.get("active"),
    }
}

fn license_from_row(row: &Row) -> License {
    License {
        id: row.get("id"),
        object_id: row.get("object_id"),
        user_id: row.get("user_id"),
        device_id: row.get("device_id"),
        issued_at: row.get("issued_at"),
        expires_at: row.get("expires_at"),
        wrapped_key: row.get("wrapped_key"),
        revoked: row.get("revoked"),
    }
}

fn session_from_row(row: &Row) -> Session {
    Session {
        id: row.get("id"),
        license_id: row.get("license_id"),
        token: row.get("token"),
        device_id: row.get("device_id"),
        started_at: row.get("started_at"),
        last_heartbeat: row.get("last_heartbeat"),
        active: row.get("active"),
    }
}

/// Maps a unique violation on the partial active-key index to `KeyConflict`.
fn insert_key_err(e: tokio_postgres::Error) -> DrmError {
    match e.code() {
        Some(&SqlState::UNIQUE_VIOLATION) => DrmError::KeyConflict,
        _ => e.into(),
    }
}

const CONTENT_KEY_COLUMNS: &str =
    "id, object_id, encrypted_key, storage_ref, checksum, created_at, active";
const LICENSE_COLUMNS: &str =
    "id, object_id, user_id, device_id, issued_at, expires_at, wrapped_key, revoked";
const SESSION_COLUMNS: &str =
    "id, license_id, token, device_id, started_at, last_heartbeat, active";

#[async_trait]
impl DrmStore for PgStore {
    async fn insert_content_key(&self, key: &ContentKey) -> Result<()> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                r#"
                INSERT INTO content_keys (id, object_id, encrypted_key, storage_ref, checksum, created_at, active)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .await?;

        client
            .execute(
                &stmt,
                &[
                    &key.id,
                    &key.object_id,
                    &key.encrypted_key,
                    &key.storage_ref,
                    &key.checksum,
                    &key.created_at,
                    &key.active,
                ],
            )
            .await
            .map_err(insert_key_err)?;

        Ok(())
    }

    async fn active_content_key(&self, object_id: Uuid) -> Result<Option<ContentKey>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                "SELECT {CONTENT_KEY_COLUMNS} FROM content_keys WHERE object_id = $1 AND active"
            ))
            .await?;

        let row = client.query_opt(&stmt, &[&object_id]).await?;
        Ok(row.as_ref().map(content_key_from_row))
    }

    async fn latest_content_key(&self, object_id: Uuid) -> Result<Option<ContentKey>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                r#"
                SELECT {CONTENT_KEY_COLUMNS} FROM content_keys
                WHERE object_id = $1
                ORDER BY created_at DESC
                LIMIT 1
                "#
            ))
            .await?;

        let row = client.query_opt(&stmt, &[&object_id]).await?;
        Ok(row.as_ref().map(content_key_from_row))
    }

    async fn deactivate_content_key(&self, object_id: Uuid) -> Result<bool> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                "UPDATE content_keys SET active = false WHERE object_id = $1 AND active",
            )
            .await?;

        let changed = client.execute(&stmt, &[&object_id]).await?;
        Ok(changed > 0)
    }

    async fn register_device(
        &self,
        user_id: Uuid,
        device_id: &str,
        max_devices: i64,
    ) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        // Serialize concurrent registrations for the same user so two
        // requests cannot both observe count < max.
        let lock = tx
            .prepare_cached("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .await?;
        tx.execute(&lock, &[&user_id.to_string()]).await?;

        let touch = tx
            .prepare_cached(
                "UPDATE device_registrations SET last_seen = NOW() WHERE user_id = $1 AND device_id = $2",
            )
            .await?;
        let touched = tx.execute(&touch, &[&user_id, &device_id]).await?;

        if touched == 0 {
            let count_stmt = tx
                .prepare_cached("SELECT COUNT(*) FROM device_registrations WHERE user_id = $1")
                .await?;
            let count: i64 = tx.query_one(&count_stmt, &[&user_id]).await?.get(0);

            if count >= max_devices {
                return Err(DrmError::DeviceLimitExceeded);
            }

            let insert = tx
                .prepare_cached(
                    r#"
                    INSERT INTO device_registrations (user_id, device_id, registered_at, last_seen)
                    VALUES ($1, $2, NOW(), NOW())
                    "#,
                )
                .await?;
            tx.execute(&insert, &[&user_id, &device_id]).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn create_license_with_session(
        &self,
        license: &License,
        session_token: &str,
    ) -> Result<Session> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let insert_license = tx
            .prepare_cached(
                r#"
                INSERT INTO licenses (id, object_id, user_id, device_id, issued_at, expires_at, wrapped_key, revoked)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .await?;
        tx.execute(
            &insert_license,
            &[
                &license.id,
                &license.object_id,
                &license.user_id,
                &license.device_id,
                &license.issued_at,
                &license.expires_at,
                &license.wrapped_key,
                &license.revoked,
            ],
        )
        .await?;

        let upsert_session = tx
            .prepare_cached(&format!(
                r#"
                INSERT INTO sessions (id, license_id, token, device_id, started_at, last_heartbeat, active)
                VALUES ($1, $2, $3, $4, $5, $5, true)
                ON CONFLICT (license_id, device_id)
                DO UPDATE SET last_heartbeat = EXCLUDED.last_heartbeat
                RETURNING {SESSION_COLUMNS}
                "#
            ))
            .await?;
        let row = tx
            .query_one(
                &upsert_session,
                &[
                    &Uuid::new_v4(),
                    &license.id,
                    &session_token,
                    &license.device_id,
                    &Utc::now(),
                ],
            )
            .await?;

        tx.commit().await?;
        Ok(session_from_row(&row))
    }

    async fn find_license(&self, license_id: Uuid) -> Result<Option<License>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                "SELECT {LICENSE_COLUMNS} FROM licenses WHERE id = $1"
            ))
            .await?;

        let row = client.query_opt(&stmt, &[&license_id]).await?;
        Ok(row.as_ref().map(license_from_row))
    }

    async fn find_session_by_token(&self, token: &str) -> Result<Option<Session>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE token = $1"
            ))
            .await?;

        let row = client.query_opt(&stmt, &[&token]).await?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn touch_session(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached("UPDATE sessions SET last_heartbeat = $2 WHERE id = $1")
            .await?;

        client.execute(&stmt, &[&session_id, &at]).await?;
        Ok(())
    }

    async fn deactivate_session(&self, session_id: Uuid) -> Result<()> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached("UPDATE sessions SET active = false WHERE id = $1")
            .await?;

        client.execute(&stmt, &[&session_id]).await?;
        Ok(())
    }

    async fn revoke_object(&self, object_id: Uuid) -> Result<RevocationSweep> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let revoke_licenses = tx
            .prepare_cached(
                "UPDATE licenses SET revoked = true WHERE object_id = $1 AND revoked = false",
            )
            .await?;
        let licenses_revoked = tx.execute(&revoke_licenses, &[&object_id]).await?;

        let deactivate_key = tx
            .prepare_cached(
                "UPDATE content_keys SET active = false WHERE object_id = $1 AND active",
            )
            .await?;
        let key_deactivated = tx.execute(&deactivate_key, &[&object_id]).await? > 0;

        let close_sessions = tx
            .prepare_cached(
                r#"
                UPDATE sessions s SET active = false
                FROM licenses l
                WHERE s.license_id = l.id AND l.object_id = $1 AND s.active
                RETURNING l.user_id, s.license_id, s.token
                "#,
            )
            .await?;
        let rows = tx.query(&close_sessions, &[&object_id]).await?;

        tx.commit().await?;

        let closed_sessions = rows
            .iter()
            .map(|row| ClosedSession {
                user_id: row.get("user_id"),
                license_id: row.get("license_id"),
                session_token: row.get("token"),
            })
            .collect();

        Ok(RevocationSweep {
            licenses_revoked,
            key_deactivated,
            closed_sessions,
        })
    }
}
