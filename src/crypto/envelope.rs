//! Symmetric envelopes for protected content and for content keys at rest.
//!
//! Content envelope wire format: `salt(16) || nonce(12) || ciphertext+tag`.
//! The AES key is derived from the content-key string with PBKDF2-HMAC-SHA256
//! so the same format survives key strings of any shape. Content keys at rest
//! are wrapped directly under the process master secret (already a uniform
//! 32-byte key, no KDF round) as `base64(ciphertext || nonce)`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::aes;
use crate::crypto::aes::{KEY_SIZE, NONCE_SIZE, SALT_SIZE, TAG_SIZE};
use crate::error::{DrmError, Result};

/// PBKDF2 iteration count for content-key derivation.
pub const PBKDF2_ROUNDS: u32 = 10_000;

/// Fixed-width envelope header: salt followed by nonce.
pub const HEADER_SIZE: usize = SALT_SIZE + NONCE_SIZE;

/// Smallest valid envelope: header plus an empty ciphertext's tag.
const MIN_ENVELOPE_SIZE: usize = HEADER_SIZE + TAG_SIZE;

/// The process-wide master secret wrapping content keys at rest.
///
/// Loaded once at startup from `Config` and injected where needed; there is
/// deliberately no global accessor.
pub struct MasterSecret(Zeroizing<[u8; KEY_SIZE]>);

impl MasterSecret {
    /// Builds a `MasterSecret` from raw bytes; must be exactly 32 bytes.
    pub fn new(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| DrmError::Crypto("master secret must be 32 bytes".to_string()))?;
        Ok(Self(Zeroizing::new(key)))
    }

    fn as_key(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// Derives a 256-bit AES key from a secret string and salt.
fn derive_key(secret: &[u8], salt: &[u8]) -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(secret, salt, PBKDF2_ROUNDS, &mut key);
    key
}

/// Generates a fresh random content key (hex-encoded 32 bytes).
pub fn generate_content_key() -> Zeroizing<String> {
    Zeroizing::new(hex::encode(aes::generate_key().as_bytes()))
}

/// Encrypts content under a content key.
///
/// Fresh salt and nonce per call; two encryptions of the same input never
/// produce the same output.
pub fn encrypt_content(plaintext: &[u8], content_key: &str) -> Result<Vec<u8>> {
    let salt = aes::generate_salt();
    let key = derive_key(content_key.as_bytes(), &salt);

    let (ciphertext, nonce) = aes::encrypt(&key, plaintext)?;

    let mut out = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts a content envelope produced by [`encrypt_content`].
///
/// Fails with `MalformedInput` when the buffer is shorter than the fixed
/// header and `AuthenticationFailure` when the tag does not verify.
pub fn decrypt_content(envelope: &[u8], content_key: &str) -> Result<Vec<u8>> {
    if envelope.len() < MIN_ENVELOPE_SIZE {
        return Err(DrmError::MalformedInput);
    }

    let (salt, rest) = envelope.split_at(SALT_SIZE);
    let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);
    let nonce: [u8; NONCE_SIZE] = nonce
        .try_into()
        .map_err(|_| DrmError::MalformedInput)?;

    let key = derive_key(content_key.as_bytes(), salt);
    aes::decrypt(&key, ciphertext, &nonce)
}

/// Wraps a content key under the master secret for storage at rest.
pub fn encrypt_key(master: &MasterSecret, content_key: &str) -> Result<String> {
    let (ciphertext, nonce) = aes::encrypt(master.as_key(), content_key.as_bytes())?;

    let mut out = Vec::with_capacity(ciphertext.len() + nonce.len());
    out.extend_from_slice(&ciphertext);
    out.extend_from_slice(&nonce);
    Ok(BASE64.encode(out))
}

/// Unwraps a stored content key with the master secret.
pub fn decrypt_key(master: &MasterSecret, encrypted: &str) -> Result<Zeroizing<String>> {
    let buf = BASE64
        .decode(encrypted)
        .map_err(|_| DrmError::MalformedInput)?;

    if buf.len() < NONCE_SIZE + TAG_SIZE {
        return Err(DrmError::MalformedInput);
    }

    let (ciphertext, nonce) = buf.split_at(buf.len() - NONCE_SIZE);
    let nonce: [u8; NONCE_SIZE] = nonce
        .try_into()
        .map_err(|_| DrmError::MalformedInput)?;

    let plaintext = aes::decrypt(master.as_key(), ciphertext, &nonce)?;
    String::from_utf8(plaintext)
        .map(Zeroizing::new)
        .map_err(|_| DrmError::MalformedInput)
}
