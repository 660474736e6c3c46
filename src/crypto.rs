//! Record payload encryption.
//!
//! # Algorithms
//!
//! - **Key**: 32 random bytes from the OS CSPRNG, carried as 64 hex chars
//! - **Encryption**: ChaCha20-Poly1305 (authenticated encryption)
//!
//! # Sealed layout
//!
//! ```text
//! [ nonce (12) | ciphertext (len) | auth tag (16) ]
//! ```
//!
//! A fresh key and nonce are drawn for every seal, so sealing the same payload
//! twice never yields the same bytes. Opening with the wrong key or opening
//! altered bytes fails with [`WelltickError::Integrity`].

use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::Value;
use std::fmt;

use crate::error::{Result, WelltickError};

/// Symmetric key length (32 bytes)
pub const KEY_LEN: usize = 32;

/// Nonce length for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_LEN: usize = 12;

/// ChaCha20-Poly1305 auth tag length (16 bytes)
pub const AUTH_TAG_LEN: usize = 16;

/// Per-record symmetric key
#[derive(Clone, PartialEq, Eq)]
pub struct RecordKey([u8; KEY_LEN]);

impl RecordKey {
    /// Draw a new key from the OS random source
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parse the hex form stored alongside a record
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let bytes = hex::decode(hex_key)
            .map_err(|e| WelltickError::Crypto(format!("Invalid key encoding: {}", e)))?;
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
            WelltickError::Crypto(format!(
                "Invalid key length: expected {}, got {}",
                KEY_LEN,
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

impl fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecordKey(..)")
    }
}

/// Encrypt `plaintext` under `key`, returning nonce-prefixed ciphertext.
pub fn encrypt(plaintext: &[u8], key: &RecordKey) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = key
        .cipher()
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| WelltickError::Crypto(format!("Encryption failed: {e}")))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt bytes produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`WelltickError::Integrity`] if the input is truncated, was altered,
/// or was sealed under a different key.
pub fn decrypt(sealed: &[u8], key: &RecordKey) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN + AUTH_TAG_LEN {
        return Err(WelltickError::Integrity(format!(
            "Sealed payload too short: {} bytes",
            sealed.len()
        )));
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    key.cipher()
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| WelltickError::Integrity("Authentication tag mismatch".into()))
}

/// Serialize and encrypt a JSON payload under a freshly generated key.
pub fn seal_json(payload: &Value) -> Result<(RecordKey, Vec<u8>)> {
    let key = RecordKey::generate();
    let plaintext = serde_json::to_vec(payload)?;
    let sealed = encrypt(&plaintext, &key)?;
    Ok((key, sealed))
}

/// Decrypt and parse a payload sealed by [`seal_json`].
pub fn open_json(sealed: &[u8], key: &RecordKey) -> Result<Value> {
    let plaintext = decrypt(sealed, key)?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| WelltickError::Integrity(format!("Decrypted payload is not JSON: {}", e)))
}
