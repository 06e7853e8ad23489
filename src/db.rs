use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::config::Host;
use tokio_postgres::NoTls;
use crate::error::{DrmError, Result};
use std::time::Duration;

/// Creates a new database connection pool.
pub fn create_pool(database_url: &str) -> Result<Pool> {
    let mut cfg = Config::new();
    let pg_config: tokio_postgres::Config = database_url.parse()?;

    if let Some(Host::Tcp(hostname)) = pg_config.get_hosts().first() {
        cfg.host = Some(hostname.to_string());
    }
    if let Some(port) = pg_config.get_ports().first() {
        cfg.port = Some(*port);
    }

    if let Some(dbname) = pg_config.get_dbname() {
        cfg.dbname = Some(dbname.to_string());
    }

    if let Some(user) = pg_config.get_user() {
        cfg.user = Some(user.to_string());
    }

    if let Some(password) = pg_config.get_password() {
        cfg.password = Some(String::from_utf8_lossy(password).to_string());
    }

    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    cfg.pool = Some(PoolConfig {
        max_size: 32,
        timeouts: deadpool_postgres::Timeouts {
            wait: Some(Duration::from_secs(5)),
            create: Some(Duration::from_secs(2)),
            recycle: Some(Duration::from_secs(1)),
        },
        ..PoolConfig::default()
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| DrmError::Internal(format!("failed to create pool: {}", e)))
}

/// DDL for the DRM tables.
///
/// The partial unique index on `content_keys` is what actually enforces the
/// single-active-key invariant. `access_grants` is written by the lending
/// workflow; it is created here so a fresh local database works end to end.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS content_keys (
    id UUID PRIMARY KEY,
    object_id UUID NOT NULL,
    encrypted_key TEXT NOT NULL,
    storage_ref TEXT,
    checksum TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    active BOOLEAN NOT NULL DEFAULT true
);
CREATE UNIQUE INDEX IF NOT EXISTS content_keys_one_active
    ON content_keys (object_id) WHERE active;

CREATE TABLE IF NOT EXISTS licenses (
    id UUID PRIMARY KEY,
    object_id UUID NOT NULL,
    user_id UUID NOT NULL,
    device_id TEXT NOT NULL,
    issued_at TIMESTAMPTZ NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL,
    wrapped_key TEXT NOT NULL,
    revoked BOOLEAN NOT NULL DEFAULT false
);
CREATE INDEX IF NOT EXISTS licenses_object ON licenses (object_id);

CREATE TABLE IF NOT EXISTS sessions (
    id UUID PRIMARY KEY,
    license_id UUID NOT NULL REFERENCES licenses (id),
    token TEXT NOT NULL UNIQUE,
    device_id TEXT NOT NULL,
    started_at TIMESTAMPTZ NOT NULL,
    last_heartbeat TIMESTAMPTZ NOT NULL,
    active BOOLEAN NOT NULL DEFAULT true,
    UNIQUE (license_id, device_id)
);
CREATE INDEX IF NOT EXISTS sessions_license ON sessions (license_id);

CREATE TABLE IF NOT EXISTS device_registrations (
    user_id UUID NOT NULL,
    device_id TEXT NOT NULL,
    registered_at TIMESTAMPTZ NOT NULL,
    last_seen TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (user_id, device_id)
);

CREATE TABLE IF NOT EXISTS access_grants (
    object_id UUID NOT NULL,
    user_id UUID NOT NULL,
    granted_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    expires_at TIMESTAMPTZ,
    PRIMARY KEY (object_id, user_id)
);
"#;

/// Creates the schema if it does not exist yet.
pub async fn init_schema(pool: &Pool) -> Result<()> {
    let client = pool.get().await?;
    client.batch_execute(SCHEMA).await?;
    tracing::info!("✅ Database schema verified");
    Ok(())
}
