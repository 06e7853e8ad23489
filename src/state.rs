use deadpool_postgres::Pool;
use redis::aio::ConnectionManager;
use rsa::RsaPrivateKey;
use std::sync::Arc;

use crate::collab::access::PgAccessOracle;
use crate::collab::publish::RedisPublisher;
use crate::collab::storage::FsObjectStorage;
use crate::collab::{AccessOracle, EventPublisher, ObjectStorage};
use crate::config::Config;
use crate::crypto::device;
use crate::crypto::envelope::MasterSecret;
use crate::error::Result;
use crate::services::licenses::LicensePolicy;
use crate::store::postgres::PgStore;
use crate::store::DrmStore;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: Pool,
    /// The relational DRM store.
    pub store: Arc<dyn DrmStore>,
    /// The access-approval oracle.
    pub access: Arc<dyn AccessOracle>,
    /// Durable storage for protected object bytes.
    pub storage: Arc<dyn ObjectStorage>,
    /// The real-time push channel.
    pub publisher: Arc<dyn EventPublisher>,
    /// The process-wide master secret.
    pub master: Arc<MasterSecret>,
    /// Issuance policy (TTL, device quota).
    pub policy: LicensePolicy,
    /// Server-held RSA private key for key-exchange material, if configured.
    pub server_key: Option<Arc<RsaPrivateKey>>,
    /// The application's configuration.
    pub config: Config,
}

impl AppState {
    /// Creates a new `AppState` from configuration.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url)?;
        tracing::info!("✅ PostgreSQL pool initialized");

        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client).await?;
        tracing::info!("✅ Redis connection manager initialized");

        let master = Arc::new(MasterSecret::new(&config.master_key)?);

        let server_key = match &config.server_key_pem_path {
            Some(path) => {
                let pem = std::fs::read_to_string(path)?;
                let key = device::load_server_key(&pem)?;
                tracing::info!("✅ Server RSA private key loaded from {}", path.display());
                Some(Arc::new(key))
            }
            None => {
                tracing::warn!("⚠️  SERVER_KEY_PEM_PATH not set; key-exchange unwrap disabled");
                None
            }
        };

        Ok(AppState {
            store: Arc::new(PgStore::new(db.clone())),
            access: Arc::new(PgAccessOracle::new(db.clone())),
            storage: Arc::new(FsObjectStorage::new(config.storage_root.clone())),
            publisher: Arc::new(RedisPublisher::new(redis)),
            master,
            policy: LicensePolicy::from_config(config),
            server_key,
            db,
            config: config.clone(),
        })
    }
}
