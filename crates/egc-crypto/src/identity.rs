//! Long-lived client identity keypair.
//!
//! Provides Ed25519 signing for handshake authentication and derives the
//! stable client identifier from the verifying key. Key material is
//! zeroized when the Identity is dropped.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use zeroize::ZeroizeOnDrop;

/// Length of the derived client identifier in hex characters.
pub const CLIENT_ID_LEN: usize = 16;

/// Error type for identity operations.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid seed length: expected 32, got {got}")]
    InvalidSeedLength { got: usize },
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid signature")]
    InvalidSignature,
}

/// A long-lived Ed25519 signing identity.
///
/// Exactly one identity exists per installation; the keystore in
/// `egc-client` owns persistence. The signing key never leaves this
/// struct — callers get signatures and public material only.
#[derive(ZeroizeOnDrop)]
pub struct Identity {
    // SigningKey zeroizes its own seed on drop
    #[zeroize(skip)]
    sign_key: SigningKey,
}

impl Identity {
    /// Generate a new random identity using the OS random source.
    pub fn generate() -> Self {
        Self {
            sign_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Reconstruct an identity from a persisted 32-byte seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self, IdentityError> {
        let seed: &[u8; 32] = seed
            .try_into()
            .map_err(|_| IdentityError::InvalidSeedLength { got: seed.len() })?;
        Ok(Self {
            sign_key: SigningKey::from_bytes(seed),
        })
    }

    /// The 32-byte seed for persistence. Callers must treat this as
    /// secret material and hand it only to the secret store.
    pub fn seed(&self) -> [u8; 32] {
        self.sign_key.to_bytes()
    }

    /// The Ed25519 verifying (public) key bytes.
    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.sign_key.verifying_key().to_bytes()
    }

    /// Derive the stable client identifier.
    ///
    /// client_id = first 16 hex characters of SHA-256(verifying key).
    pub fn client_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.verifying_key_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..CLIENT_ID_LEN / 2])
    }

    /// Produce a detached Ed25519 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        let signature: Signature = self.sign_key.sign(message);
        signature.to_bytes()
    }
}

/// Verify a detached Ed25519 signature.
pub fn verify_signature(
    pub_key: &[u8; 32],
    message: &[u8],
    signature: &[u8; 64],
) -> Result<(), IdentityError> {
    let verifying_key =
        VerifyingKey::from_bytes(pub_key).map_err(|_| IdentityError::InvalidPublicKey)?;
    let sig = Signature::from_bytes(signature);
    verifying_key
        .verify_strict(message, &sig)
        .map_err(|_| IdentityError::InvalidSignature)
}
