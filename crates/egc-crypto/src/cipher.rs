//! Authenticated payload encryption.
//!
//! XChaCha20-Poly1305 over canonical JSON bytes. The wire form is
//! standard padded base64 of `nonce(24) || ciphertext+tag`, matching
//! the deployed gateway counterpart. The nonce is generated inside
//! `seal_payload` and is never accepted from callers.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};

use crate::session::SharedContext;

/// XChaCha20 nonce length in bytes.
pub const NONCE_LEN: usize = 24;

/// Poly1305 authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Error type for payload cipher operations.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("invalid blob: too short")]
    InvalidBlob,
    #[error("invalid base64 payload")]
    Encoding,
    #[error("payload serialization failed: {0}")]
    Serialization(String),
    #[error("RNG failed")]
    RngError,
}

/// Encrypt a structured payload under the shared context.
///
/// Returns base64(nonce || ciphertext+tag). Every call draws a fresh
/// random nonce, so encrypting the same payload twice yields different
/// blobs.
pub fn seal_payload(
    context: &SharedContext,
    payload: &serde_json::Value,
) -> Result<String, CipherError> {
    let plaintext =
        serde_json::to_vec(payload).map_err(|e| CipherError::Serialization(e.to_string()))?;

    let mut nonce = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut nonce).map_err(|_| CipherError::RngError)?;

    let cipher = XChaCha20Poly1305::new(Key::from_slice(context.key()));
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext.as_slice())
        .map_err(|_| CipherError::EncryptionFailed)?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(B64.encode(blob))
}

/// Decrypt a base64 payload blob under the shared context.
///
/// Authentication failure and malformed input are hard failures; no
/// partial plaintext is ever returned.
pub fn open_payload(
    context: &SharedContext,
    blob_b64: &str,
) -> Result<serde_json::Value, CipherError> {
    let blob = B64.decode(blob_b64).map_err(|_| CipherError::Encoding)?;
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(CipherError::InvalidBlob);
    }
    let (nonce, ciphertext) = blob.split_at(NONCE_LEN);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(context.key()));
    let plaintext = cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CipherError::DecryptionFailed)?;

    serde_json::from_slice(&plaintext).map_err(|e| CipherError::Serialization(e.to_string()))
}
