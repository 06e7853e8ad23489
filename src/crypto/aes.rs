use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use aes_gcm::aead::rand_core::RngCore;
use base64::{engine::general_purpose, Engine as _};
use zeroize::{Zeroize, ZeroizeOnDrop};
use crate::error::{DrmError, Result};

/// The size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// The size of the KDF salt in bytes.
pub const SALT_SIZE: usize = 16;
/// The size of the AES-GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// The size of a session token in raw bytes (before base64).
const TOKEN_SIZE: usize = 32;

/// A secure key wrapper that ensures the key is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecureKey([u8; KEY_SIZE]);

impl SecureKey {
    /// Creates a new `SecureKey` from a byte array.
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self(key)
    }

    /// Returns a reference to the key as a byte slice.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// Generates a new random AES-256 key.
pub fn generate_key() -> SecureKey {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    SecureKey::new(key)
}

/// Generates a new random AES-GCM nonce.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Generates a new random KDF salt.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Generates a fresh opaque session token (URL-safe base64).
pub fn generate_token() -> String {
    let mut token = [0u8; TOKEN_SIZE];
    OsRng.fill_bytes(&mut token);
    general_purpose::URL_SAFE_NO_PAD.encode(token)
}

/// Encrypts a plaintext using AES-256-GCM with a fresh nonce.
///
/// Returns the ciphertext (tag appended) and the nonce used.
pub fn encrypt(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_SIZE])> {
    let cipher = Aes256Gcm::new(key.into());

    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from(nonce_bytes);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| DrmError::Crypto(format!("Encryption failed: {}", e)))?;

    Ok((ciphertext, nonce_bytes))
}

/// Decrypts a ciphertext using AES-256-GCM.
///
/// Fails with `AuthenticationFailure` when the tag does not verify —
/// tampered input and a wrong key are indistinguishable here.
pub fn decrypt(key: &[u8; KEY_SIZE], ciphertext: &[u8], nonce: &[u8; NONCE_SIZE]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.into());
    let nonce = Nonce::from(*nonce);

    cipher
        .decrypt(&nonce, ciphertext)
        .map_err(|_| DrmError::AuthenticationFailure)
}
