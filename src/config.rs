use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use anyhow::{Context, Result};
use zeroize::{Zeroize, Zeroizing};

/// The application's configuration.
///
/// Loaded once at process start; the master secret lives here for its whole
/// lifecycle and is handed to the crypto layer as a constructor dependency.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The URL of the Redis server backing the revocation push channel.
    pub redis_url: String,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Root directory for protected object blobs.
    pub storage_root: PathBuf,
    /// License validity window in hours.
    pub license_ttl_hours: i64,
    /// Maximum concurrent devices per user, across all protected objects.
    pub max_devices_per_user: i64,
    /// The process-wide master secret used to wrap content keys at rest.
    pub master_key: Zeroizing<Vec<u8>>,
    /// Optional PKCS#8 PEM file holding the server's RSA private key
    /// (key-exchange material; rotated out of band).
    pub server_key_pem_path: Option<PathBuf>,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    pub fn from_env() -> Result<Self> {
        let mut master_key_hex = env::var("MASTER_KEY")
            .context("MASTER_KEY must be set (generate with: openssl rand -hex 32)")?;

        let master_key_bytes = hex::decode(&master_key_hex)
            .context("MASTER_KEY must be valid hexadecimal")?;

        master_key_hex.zeroize();

        if master_key_bytes.len() != 32 {
            anyhow::bail!("MASTER_KEY must be exactly 32 bytes (64 hex characters)");
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:4450".to_string())
                .parse()
                .context("Invalid BIND_ADDR")?,
            storage_root: env::var("STORAGE_ROOT")
                .unwrap_or_else(|_| "objects".to_string())
                .into(),
            license_ttl_hours: env::var("LICENSE_TTL_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .context("Invalid LICENSE_TTL_HOURS")?,
            max_devices_per_user: env::var("MAX_DEVICES_PER_USER")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("Invalid MAX_DEVICES_PER_USER")?,
            master_key: Zeroizing::new(master_key_bytes),
            server_key_pem_path: env::var("SERVER_KEY_PEM_PATH").ok().map(PathBuf::from),
        })
    }
}
