use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The DRM subsystem's error type.
///
/// Every operation returns one of these to its direct caller; nothing is
/// swallowed inside the core except the best-effort revocation push.
#[derive(Error, Debug)]
pub enum DrmError {
    /// The caller holds no valid access grant for the protected object.
    #[error("access denied")]
    AccessDenied,

    /// Registering this device would exceed the user's device quota.
    #[error("device limit exceeded")]
    DeviceLimitExceeded,

    /// No active content key exists (object unprotected or mid-rotation).
    #[error("no active content key")]
    KeyNotFound,

    /// An active content key already exists for the object.
    #[error("an active content key already exists")]
    KeyConflict,

    /// The device public key PEM could not be parsed.
    #[error("invalid device public key: {0}")]
    InvalidPublicKey(String),

    /// The payload exceeds the RSA modulus capacity for the chosen padding.
    #[error("plaintext exceeds the RSA payload capacity")]
    PlaintextTooLarge,

    /// AEAD tag verification failed (tampering or wrong key).
    #[error("ciphertext failed authentication")]
    AuthenticationFailure,

    /// The envelope buffer is shorter than its fixed header, or otherwise
    /// not decodable.
    #[error("malformed envelope input")]
    MalformedInput,

    /// The session token matches no known session.
    #[error("session not found")]
    SessionNotFound,

    /// A session points at a license row that does not exist.
    #[error("license not found")]
    LicenseNotFound,

    /// The license backing this session has been revoked; the client must
    /// stop using the content.
    #[error("license revoked")]
    LicenseRevoked,

    /// A validation error.
    #[error("validation error: {0}")]
    Validation(String),

    /// A database error.
    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A database pool error.
    #[error("database pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A Redis error.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A cryptographic operation failed for a reason other than
    /// authentication (bad key sizes, RSA internals).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// An internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `DrmError` as the error type.
pub type Result<T> = std::result::Result<T, DrmError>;

impl IntoResponse for DrmError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            DrmError::AccessDenied => {
                tracing::warn!("Access denied");
                (StatusCode::FORBIDDEN, self.to_string())
            }

            DrmError::DeviceLimitExceeded => {
                tracing::warn!("Device limit exceeded");
                (StatusCode::CONFLICT, self.to_string())
            }

            DrmError::KeyNotFound => {
                tracing::debug!("No active content key");
                (StatusCode::NOT_FOUND, self.to_string())
            }

            DrmError::KeyConflict => {
                tracing::warn!("Active content key already exists");
                (StatusCode::CONFLICT, self.to_string())
            }

            DrmError::InvalidPublicKey(ref msg) => {
                tracing::warn!("Invalid device public key: {}", msg);
                (StatusCode::BAD_REQUEST, "invalid device public key".to_string())
            }

            DrmError::PlaintextTooLarge => {
                tracing::warn!("Plaintext exceeds RSA payload capacity");
                (StatusCode::BAD_REQUEST, self.to_string())
            }

            DrmError::AuthenticationFailure => {
                tracing::error!("Ciphertext failed authentication");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }

            DrmError::MalformedInput => {
                tracing::warn!("Malformed envelope input");
                (StatusCode::BAD_REQUEST, self.to_string())
            }

            DrmError::SessionNotFound => {
                tracing::debug!("Session not found");
                (StatusCode::NOT_FOUND, self.to_string())
            }

            DrmError::LicenseNotFound => {
                tracing::error!("Session references a missing license");
                (StatusCode::NOT_FOUND, self.to_string())
            }

            DrmError::LicenseRevoked => {
                tracing::info!("Heartbeat on a revoked license");
                (StatusCode::GONE, self.to_string())
            }

            DrmError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            DrmError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database error".to_string())
            }

            DrmError::Pool(ref e) => {
                tracing::error!("Database pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database error".to_string())
            }

            DrmError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "push channel error".to_string())
            }

            DrmError::Io(ref e) => {
                tracing::error!("IO error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "file system error".to_string())
            }

            DrmError::Crypto(ref msg) => {
                tracing::error!("Crypto error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "encryption error".to_string())
            }

            DrmError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"internal server error"}"#.to_string());

        (status, body).into_response()
    }
}
