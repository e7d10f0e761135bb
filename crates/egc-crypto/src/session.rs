//! Handshake key exchange.
//!
//! One handshake per session: a fresh X25519 ephemeral keypair is
//! generated for every attempt, the identity key signs a random
//! challenge, and the server's ephemeral public key is combined with
//! ours to derive the shared AEAD context via HKDF-SHA256.
//!
//! The ephemeral secret is consumed by the Diffie-Hellman computation
//! and zeroized on every exit path, so it can never be reused across
//! sessions.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use hkdf::Hkdf;
use rand_core::OsRng;
use serde::Serialize;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::identity::Identity;

/// HKDF info string binding derived keys to this protocol version.
const SESSION_KEY_INFO: &[u8] = b"egc_session_key_v1";

/// Length of the random handshake challenge in bytes.
pub const CHALLENGE_LEN: usize = 32;

/// Error type for key exchange operations.
#[derive(Debug, thiserror::Error)]
pub enum KeyExchangeError {
    #[error("malformed server ephemeral key: expected 32 bytes, got {got}")]
    MalformedServerKey { got: usize },
    #[error("no handshake in progress")]
    NoPendingHandshake,
    #[error("RNG failed")]
    RngError,
}

/// Wire fields of a handshake request.
///
/// All binary fields are standard padded base64. The client layer wraps
/// this under a top-level `handshake_request` key before sending.
#[derive(Debug, Clone, Serialize)]
pub struct HandshakeRequest {
    /// Client type tag identifying the calling component
    pub component: String,
    /// Ed25519 identity verifying key
    pub identity_key: String,
    /// Fresh X25519 ephemeral public key
    pub public_key: String,
    /// Unix seconds at request assembly
    pub timestamp: u64,
    /// Random 32-byte challenge
    pub challenge: String,
    /// Detached identity signature over the raw challenge bytes
    pub signature: String,
}

/// The derived shared encryption context for one session.
///
/// Opaque 32-byte AEAD key, zeroized on drop. Used for both directions
/// of session traffic.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedContext {
    key: [u8; 32],
}

impl SharedContext {
    /// The raw AEAD key. Only the payload cipher reads this.
    pub fn key(&self) -> &[u8; 32] {
        &self.key
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn from_key(key: [u8; 32]) -> Self {
        Self { key }
    }
}

/// Two-state handshake machine: `NotEstablished` or `Established`.
///
/// No partially-established state is observable; `complete` either
/// stores a usable context or leaves the machine exactly as a fresh
/// `reset` would.
pub struct KeyExchange {
    pending: Option<EphemeralSecret>,
    context: Option<Arc<SharedContext>>,
}

impl KeyExchange {
    pub fn new() -> Self {
        Self {
            pending: None,
            context: None,
        }
    }

    /// Start a handshake attempt.
    ///
    /// Generates a fresh ephemeral keypair (discarding any previous one
    /// along with any established context), a random challenge, and the
    /// identity signature over it. `timestamp` is unix seconds supplied
    /// by the caller.
    pub fn begin(
        &mut self,
        identity: &Identity,
        component: &str,
        timestamp: u64,
    ) -> Result<HandshakeRequest, KeyExchangeError> {
        // A new attempt invalidates whatever came before it
        self.pending = None;
        self.context = None;

        let mut challenge = [0u8; CHALLENGE_LEN];
        getrandom::getrandom(&mut challenge).map_err(|_| KeyExchangeError::RngError)?;
        let signature = identity.sign(&challenge);

        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_pub = X25519PublicKey::from(&ephemeral);

        let request = HandshakeRequest {
            component: component.to_string(),
            identity_key: B64.encode(identity.verifying_key_bytes()),
            public_key: B64.encode(ephemeral_pub.as_bytes()),
            timestamp,
            challenge: B64.encode(challenge),
            signature: B64.encode(signature),
        };

        self.pending = Some(ephemeral);
        challenge.zeroize();
        Ok(request)
    }

    /// Consume the server's ephemeral public key and derive the shared
    /// context.
    ///
    /// On any failure the pending ephemeral has already been discarded
    /// and the machine is `NotEstablished`.
    pub fn complete(&mut self, server_eph_pub: &[u8]) -> Result<(), KeyExchangeError> {
        // Taking the secret first guarantees it is dropped (and
        // zeroized) even when validation fails below.
        let ephemeral = self
            .pending
            .take()
            .ok_or(KeyExchangeError::NoPendingHandshake)?;

        let server_pub: [u8; 32] = server_eph_pub
            .try_into()
            .map_err(|_| KeyExchangeError::MalformedServerKey {
                got: server_eph_pub.len(),
            })?;

        let shared_secret = ephemeral.diffie_hellman(&X25519PublicKey::from(server_pub));

        // Never use raw DH output as an AEAD key
        let hk = Hkdf::<Sha256>::new(None, shared_secret.as_bytes());
        let mut key = [0u8; 32];
        hk.expand(SESSION_KEY_INFO, &mut key)
            .expect("HKDF expand should not fail for 32-byte output");

        self.context = Some(Arc::new(SharedContext { key }));
        Ok(())
    }

    /// Whether a shared context is present and usable.
    pub fn is_established(&self) -> bool {
        self.context.is_some()
    }

    /// The shared context, if established.
    ///
    /// Returned behind an `Arc` so callers can encrypt concurrently
    /// without holding whatever lock guards the exchange itself.
    pub fn context(&self) -> Option<Arc<SharedContext>> {
        self.context.clone()
    }

    /// Discard the shared context and any pending ephemeral keypair.
    ///
    /// Both are zeroized on drop; the machine returns to `NotEstablished`.
    pub fn reset(&mut self) {
        self.pending = None;
        self.context = None;
    }
}

impl Default for KeyExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::verify_signature;
    use x25519_dalek::StaticSecret;

    fn server_keypair() -> (StaticSecret, [u8; 32]) {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = *X25519PublicKey::from(&secret).as_bytes();
        (secret, public)
    }

    #[test]
    fn test_begin_produces_well_formed_request() {
        let identity = Identity::generate();
        let mut kex = KeyExchange::new();

        let request = kex.begin(&identity, "client", 1_700_000_000).unwrap();

        assert_eq!(request.component, "client");
        assert_eq!(request.timestamp, 1_700_000_000);
        assert_eq!(
            B64.decode(&request.identity_key).unwrap(),
            identity.verifying_key_bytes()
        );
        assert_eq!(B64.decode(&request.public_key).unwrap().len(), 32);

        // Signature must verify over the raw challenge bytes
        let challenge = B64.decode(&request.challenge).unwrap();
        let signature: [u8; 64] = B64
            .decode(&request.signature)
            .unwrap()
            .try_into()
            .unwrap();
        assert!(
            verify_signature(&identity.verifying_key_bytes(), &challenge, &signature).is_ok()
        );
    }

    #[test]
    fn test_complete_establishes_context() {
        let identity = Identity::generate();
        let mut kex = KeyExchange::new();
        let (_server_secret, server_pub) = server_keypair();

        let _request = kex.begin(&identity, "client", 0).unwrap();
        assert!(!kex.is_established());

        kex.complete(&server_pub).unwrap();
        assert!(kex.is_established());
        assert!(kex.context().is_some());
    }

    #[test]
    fn test_both_sides_derive_the_same_key() {
        let identity = Identity::generate();
        let mut kex = KeyExchange::new();
        let (server_secret, server_pub) = server_keypair();

        let request = kex.begin(&identity, "client", 0).unwrap();
        kex.complete(&server_pub).unwrap();

        // Server side: DH with the client's ephemeral public key, then
        // the same HKDF expansion.
        let client_eph: [u8; 32] = B64
            .decode(&request.public_key)
            .unwrap()
            .try_into()
            .unwrap();
        let dh = server_secret.diffie_hellman(&X25519PublicKey::from(client_eph));
        let hk = Hkdf::<Sha256>::new(None, dh.as_bytes());
        let mut server_key = [0u8; 32];
        hk.expand(SESSION_KEY_INFO, &mut server_key).unwrap();

        assert_eq!(kex.context().unwrap().key(), &server_key);
    }

    #[test]
    fn test_complete_without_begin_fails() {
        let mut kex = KeyExchange::new();
        assert!(matches!(
            kex.complete(&[0u8; 32]),
            Err(KeyExchangeError::NoPendingHandshake)
        ));
        assert!(!kex.is_established());
    }

    #[test]
    fn test_malformed_server_key_discards_pending() {
        let identity = Identity::generate();
        let mut kex = KeyExchange::new();

        kex.begin(&identity, "client", 0).unwrap();
        assert!(matches!(
            kex.complete(&[0u8; 31]),
            Err(KeyExchangeError::MalformedServerKey { got: 31 })
        ));
        assert!(!kex.is_established());

        // The pending ephemeral was consumed by the failed attempt
        assert!(matches!(
            kex.complete(&[0u8; 32]),
            Err(KeyExchangeError::NoPendingHandshake)
        ));
    }

    #[test]
    fn test_second_begin_discards_first_ephemeral() {
        let identity = Identity::generate();
        let mut kex = KeyExchange::new();
        let (server_secret, server_pub) = server_keypair();

        let first = kex.begin(&identity, "client", 0).unwrap();
        let second = kex.begin(&identity, "client", 0).unwrap();
        assert_ne!(first.public_key, second.public_key);
        assert_ne!(first.challenge, second.challenge);

        // Completing now must match the second ephemeral, not the first
        kex.complete(&server_pub).unwrap();
        let second_eph: [u8; 32] = B64.decode(&second.public_key).unwrap().try_into().unwrap();
        let dh = server_secret.diffie_hellman(&X25519PublicKey::from(second_eph));
        let hk = Hkdf::<Sha256>::new(None, dh.as_bytes());
        let mut expected = [0u8; 32];
        hk.expand(SESSION_KEY_INFO, &mut expected).unwrap();
        assert_eq!(kex.context().unwrap().key(), &expected);
    }

    #[test]
    fn test_begin_after_established_drops_context() {
        let identity = Identity::generate();
        let mut kex = KeyExchange::new();
        let (_s, server_pub) = server_keypair();

        kex.begin(&identity, "client", 0).unwrap();
        kex.complete(&server_pub).unwrap();
        assert!(kex.is_established());

        kex.begin(&identity, "client", 0).unwrap();
        assert!(!kex.is_established());
    }

    #[test]
    fn test_reset_returns_to_not_established() {
        let identity = Identity::generate();
        let mut kex = KeyExchange::new();
        let (_s, server_pub) = server_keypair();

        kex.begin(&identity, "client", 0).unwrap();
        kex.complete(&server_pub).unwrap();
        assert!(kex.is_established());

        kex.reset();
        assert!(!kex.is_established());
        assert!(kex.context().is_none());
    }
}
