//! Asymmetric wrapping of content keys for client devices.
//!
//! Two client profiles exist on the wire: `generic` (SPKI PEM, RSA-OAEP with
//! SHA-256) and `legacy` (PKCS#1 PEM, RSA-PKCS1v1.5) for constrained mobile
//! runtimes without OAEP support. The profile is always chosen explicitly by
//! the caller; a key that does not parse under the requested profile is an
//! error, never a fallback.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::{DrmError, Result};

/// OAEP-SHA256 padding overhead in bytes (2 * hash length + 2).
const OAEP_OVERHEAD: usize = 2 * 32 + 2;
/// PKCS#1 v1.5 padding overhead in bytes.
const PKCS1_OVERHEAD: usize = 11;

/// Which wrapping scheme a client device speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceProfile {
    /// SPKI public key, RSA-OAEP with SHA-256 label and MGF1.
    Generic,
    /// PKCS#1 public key, RSA-PKCS1v1.5.
    Legacy,
}

fn payload_fits(key: &RsaPublicKey, len: usize, overhead: usize) -> Result<()> {
    let capacity = key.size().saturating_sub(overhead);
    if len > capacity {
        return Err(DrmError::PlaintextTooLarge);
    }
    Ok(())
}

fn encrypt_err(e: rsa::Error) -> DrmError {
    match e {
        rsa::Error::MessageTooLong => DrmError::PlaintextTooLarge,
        e => DrmError::Crypto(format!("rsa encrypt failed: {}", e)),
    }
}

/// Wraps a content key for a device's public key.
///
/// The output is base64; only this wrapped form ever crosses the wire — the
/// server never sends a usable plaintext key.
pub fn wrap_key_for_device(
    content_key: &str,
    device_public_key_pem: &str,
    profile: DeviceProfile,
) -> Result<String> {
    let payload = content_key.as_bytes();
    let mut rng = rand::rngs::OsRng;

    let wrapped = match profile {
        DeviceProfile::Generic => {
            let key = RsaPublicKey::from_public_key_pem(device_public_key_pem)
                .map_err(|e| DrmError::InvalidPublicKey(e.to_string()))?;
            payload_fits(&key, payload.len(), OAEP_OVERHEAD)?;
            key.encrypt(&mut rng, Oaep::new::<Sha256>(), payload)
                .map_err(encrypt_err)?
        }
        DeviceProfile::Legacy => {
            let key = RsaPublicKey::from_pkcs1_pem(device_public_key_pem)
                .map_err(|e| DrmError::InvalidPublicKey(e.to_string()))?;
            payload_fits(&key, payload.len(), PKCS1_OVERHEAD)?;
            key.encrypt(&mut rng, Pkcs1v15Encrypt, payload)
                .map_err(encrypt_err)?
        }
    };

    Ok(BASE64.encode(wrapped))
}

/// Loads the server's RSA private key from PKCS#8 PEM.
pub fn load_server_key(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .map_err(|e| DrmError::Crypto(format!("server private key: {}", e)))
}

/// Decrypts server-held key-exchange material (OAEP-SHA256).
pub fn unwrap_with_server_key(server_key: &RsaPrivateKey, wrapped: &str) -> Result<Vec<u8>> {
    let ciphertext = BASE64
        .decode(wrapped)
        .map_err(|_| DrmError::MalformedInput)?;

    server_key
        .decrypt(Oaep::new::<Sha256>(), &ciphertext)
        .map_err(|_| DrmError::AuthenticationFailure)
}
