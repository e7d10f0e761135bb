//! Encrypted gateway client - end-to-end encrypted transport sessions.
//!
//! This crate implements:
//! - Persistent signing identity with secure storage
//! - Handshake-driven session establishment against a gateway
//! - Session lifecycle state machine with observable status
//! - Transport routing (plaintext-exempt vs encrypted endpoints)
//! - Encrypted request/response envelopes
//!
//! The cryptographic primitives live in `egc-crypto`; this crate wires
//! them into an async client. There is no plaintext fallback anywhere:
//! encrypted-classified requests without an established session fail.

#![forbid(unsafe_code)]

// Client layers
pub mod router;
pub mod session;

// Collaborators
pub mod routes;
pub mod store;
pub mod transport;

// Supporting modules
pub mod config;
pub mod errors;

pub use config::{ClientConfig, ConfigError};
pub use errors::ClientError;
pub use router::GatewayClient;
pub use routes::{RouteClass, RouteTable};
pub use session::{SessionManager, SessionStatus};
pub use store::{FileSecretStore, IdentityKeyStore, MemorySecretStore, SecretStore};
pub use transport::{HttpTransport, Method, ReqwestTransport, TransportResponse};
