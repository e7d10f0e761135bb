//! Cryptographic core for the encrypted gateway client.
//!
//! This crate implements:
//! - Long-lived Ed25519 identity keypairs and client id derivation
//! - Per-session X25519 handshake key exchange with HKDF key derivation
//! - Authenticated payload encryption (XChaCha20-Poly1305, base64 wire)
//!
//! No I/O happens here; persistence and transport live in `egc-client`.

#![forbid(unsafe_code)]

pub mod cipher;
pub mod identity;
pub mod session;

#[cfg(test)]
mod proptests;

pub use cipher::{open_payload, seal_payload, CipherError, NONCE_LEN, TAG_LEN};
pub use identity::{verify_signature, Identity, IdentityError};
pub use session::{HandshakeRequest, KeyExchange, KeyExchangeError, SharedContext};
