//! Error types for the encrypted gateway client.
//!
//! Security failures (handshake, decryption) and ordinary API failures
//! (4xx/5xx) are distinct variants so calling code can pattern-match on
//! kind instead of string-matching messages. Security failures must
//! block encrypted traffic; API failures are endpoint-specific.

use thiserror::Error;

use egc_crypto::{CipherError, IdentityError, KeyExchangeError};

/// Unified error type for client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Signing requested before an identity was loaded
    #[error("identity key unavailable: run identity load first")]
    KeyUnavailable,

    /// Handshake response missing required fields
    #[error("malformed handshake response: {0}")]
    MalformedHandshakeResponse(String),

    /// Any handshake-stage failure. Never triggers plaintext fallback.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Encrypt attempted with no established shared context
    #[error("encryption unavailable: no established session")]
    EncryptionUnavailable,

    /// Authentication/integrity failure or malformed ciphertext
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Encrypted-classified request attempted before handshake
    #[error("no active session: call establish() before encrypted requests")]
    NoActiveSession,

    /// Non-2xx HTTP status on a plaintext or decrypted response
    #[error("api error: status {status}")]
    Api {
        status: u16,
        body: Option<serde_json::Value>,
    },

    /// Transport-level failure with no HTTP status
    #[error("network error: {0}")]
    Network(String),

    /// Caller-specified deadline elapsed
    #[error("operation timed out")]
    Timeout,

    /// Secret store failure
    #[error("secret store error: {0}")]
    Store(String),

    /// Configuration failure
    #[error("config error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether this error is security-critical.
    ///
    /// Security failures must be surfaced as blocking errors and never
    /// downgraded to plaintext or retried in a way that could mask a
    /// man-in-the-middle condition.
    pub fn is_security_failure(&self) -> bool {
        matches!(
            self,
            ClientError::HandshakeFailed(_)
                | ClientError::MalformedHandshakeResponse(_)
                | ClientError::DecryptionFailed(_)
        )
    }
}

impl From<IdentityError> for ClientError {
    fn from(e: IdentityError) -> Self {
        ClientError::Store(e.to_string())
    }
}

impl From<KeyExchangeError> for ClientError {
    fn from(e: KeyExchangeError) -> Self {
        match e {
            KeyExchangeError::MalformedServerKey { .. } => {
                ClientError::MalformedHandshakeResponse(e.to_string())
            }
            other => ClientError::HandshakeFailed(other.to_string()),
        }
    }
}

impl From<CipherError> for ClientError {
    fn from(e: CipherError) -> Self {
        match e {
            // Serialization covers decrypted bytes that are not valid
            // JSON, which is a hard decryption failure on the open path
            CipherError::DecryptionFailed
            | CipherError::InvalidBlob
            | CipherError::Encoding
            | CipherError::Serialization(_) => ClientError::DecryptionFailed(e.to_string()),
            CipherError::EncryptionFailed | CipherError::RngError => {
                ClientError::EncryptionUnavailable
            }
        }
    }
}
