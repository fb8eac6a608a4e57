//! AES-256-GCM sealing of serialized credential records.
//!
//! A sealed record is `base64(nonce || ciphertext)`, so a single column holds
//! everything needed to open it again with the master key.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// Decodes a base64 master key and checks it is 32 bytes.
pub fn validate_key(key_base64: &str) -> Result<Vec<u8>> {
    let key = BASE64
        .decode(key_base64.trim())
        .context("Encryption key is not valid base64")?;
    if key.len() != KEY_SIZE {
        bail!(
            "Encryption key must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            key.len()
        );
    }
    Ok(key)
}

fn cipher(key: &[u8]) -> Result<Aes256Gcm> {
    if key.len() != KEY_SIZE {
        bail!("Encryption key must be {} bytes", KEY_SIZE);
    }
    Aes256Gcm::new_from_slice(key).map_err(|e| anyhow!("Failed to create cipher: {}", e))
}

/// Seals `plaintext` under a fresh random nonce.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<String> {
    let cipher = cipher(key)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(sealed))
}

/// Opens a value produced by [`encrypt`]. Fails on a wrong key or any
/// tampering.
pub fn decrypt(sealed: &str, key: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher(key)?;
    let bytes = BASE64
        .decode(sealed)
        .context("Sealed value is not valid base64")?;
    if bytes.len() <= NONCE_SIZE {
        bail!("Sealed value too short: {} bytes", bytes.len());
    }

    let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| anyhow!("Decryption failed (wrong key or corrupted data): {}", e))
}
