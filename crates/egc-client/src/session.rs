//! Session lifecycle state machine.
//!
//! Drives the handshake key exchange against the gateway, tracks a
//! human-readable status for observability, and owns the shared
//! encryption context. Handshake execution is mutually exclusive: a
//! second concurrent `establish` waits on the lock and no-ops once the
//! first has succeeded. Encrypted requests read the context through a
//! separate slot so they never queue behind an in-flight handshake.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use tokio::sync::{Mutex, RwLock};

use egc_crypto::{KeyExchange, SharedContext};

use crate::errors::ClientError;
use crate::store::IdentityKeyStore;
use crate::transport::{HttpTransport, Method};

/// Observable session phase. Display gives the fixed status phrases;
/// the phrases are for observability/UI binding, never control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    NotInitialized,
    Establishing,
    Active,
    Failed(String),
    Reset,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::NotInitialized => write!(f, "Not initialized"),
            SessionStatus::Establishing => write!(f, "Establishing handshake..."),
            SessionStatus::Active => write!(f, "Encrypted (Active)"),
            SessionStatus::Failed(detail) => write!(f, "Encryption Failed: {detail}"),
            SessionStatus::Reset => write!(f, "Reset - Not encrypted"),
        }
    }
}

struct SessionInner {
    keystore: IdentityKeyStore,
    kex: KeyExchange,
}

/// Session lifecycle manager.
///
/// At most one session is active per client process. Failures surface
/// as security-critical errors; there is no fallback path to plaintext
/// anywhere in this type.
pub struct SessionManager {
    // Guards handshake execution and all key mutation
    inner: Mutex<SessionInner>,
    // Written only at handshake completion/reset; read per encrypted
    // request without touching the handshake lock
    active: RwLock<Option<Arc<SharedContext>>>,
    status: RwLock<SessionStatus>,
    transport: Arc<dyn HttpTransport>,
    handshake_url: String,
    component: String,
    timeout: Duration,
}

impl SessionManager {
    pub fn new(
        keystore: IdentityKeyStore,
        transport: Arc<dyn HttpTransport>,
        base_url: &str,
        component: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                keystore,
                kex: KeyExchange::new(),
            }),
            active: RwLock::new(None),
            status: RwLock::new(SessionStatus::NotInitialized),
            transport,
            handshake_url: format!("{}/handshake", base_url.trim_end_matches('/')),
            component: component.to_string(),
            timeout,
        }
    }

    /// Run the handshake and establish the shared context.
    ///
    /// Single-flight: concurrent callers serialize on the handshake
    /// lock, and whoever arrives after a success returns immediately.
    /// On failure the session is left `NotEstablished` and the error
    /// propagates; subsequent encrypted requests fail fast with
    /// `NoActiveSession`.
    pub async fn establish(&self) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        if inner.kex.is_established() {
            tracing::debug!("session already established");
            return Ok(());
        }

        *self.status.write().await = SessionStatus::Establishing;

        match self.run_handshake(&mut inner).await {
            Ok(context) => {
                *self.active.write().await = Some(context);
                *self.status.write().await = SessionStatus::Active;
                tracing::info!(url = %self.handshake_url, "secure session established");
                Ok(())
            }
            Err(e) => {
                inner.kex.reset();
                *self.active.write().await = None;
                *self.status.write().await = SessionStatus::Failed(e.to_string());
                tracing::warn!(error = %e, "handshake failed");
                Err(e)
            }
        }
    }

    async fn run_handshake(
        &self,
        inner: &mut SessionInner,
    ) -> Result<Arc<SharedContext>, ClientError> {
        inner.keystore.load_or_create()?;
        let identity = inner
            .keystore
            .identity()
            .ok_or(ClientError::KeyUnavailable)?;

        let timestamp = unix_now();
        let request = inner.kex.begin(identity, &self.component, timestamp)?;
        let body = serde_json::json!({ "handshake_request": request });

        tracing::debug!(url = %self.handshake_url, "sending handshake request");
        let response = tokio::time::timeout(
            self.timeout,
            self.transport.send(Method::Post, &self.handshake_url, Some(&body)),
        )
        .await
        .map_err(|_| ClientError::Timeout)?
        .map_err(|e| match e {
            // Transport failures during the handshake are handshake
            // failures; timeouts keep their distinct kind
            ClientError::Network(detail) => ClientError::HandshakeFailed(detail),
            other => other,
        })?;

        if !response.is_success() {
            return Err(ClientError::HandshakeFailed(format!(
                "gateway returned status {}",
                response.status
            )));
        }

        let parsed: serde_json::Value = serde_json::from_str(&response.body).map_err(|e| {
            ClientError::MalformedHandshakeResponse(format!("response is not JSON: {e}"))
        })?;
        let server_key_b64 = parsed
            .get("handshake_response")
            .and_then(|r| r.get("public_key"))
            .and_then(|k| k.as_str())
            .ok_or_else(|| {
                ClientError::MalformedHandshakeResponse(
                    "missing handshake_response.public_key".to_string(),
                )
            })?;
        let server_key = B64.decode(server_key_b64).map_err(|_| {
            ClientError::MalformedHandshakeResponse("public_key is not valid base64".to_string())
        })?;

        inner.kex.complete(&server_key)?;
        inner
            .kex
            .context()
            .ok_or_else(|| ClientError::HandshakeFailed("context missing after completion".into()))
    }

    /// The shared context for an encrypted request.
    ///
    /// Fails fast with `NoActiveSession` instead of waiting on an
    /// in-flight handshake.
    pub async fn context(&self) -> Result<Arc<SharedContext>, ClientError> {
        self.active
            .read()
            .await
            .clone()
            .ok_or(ClientError::NoActiveSession)
    }

    /// The derived client identifier, if an identity is loaded.
    pub async fn client_id(&self) -> Option<String> {
        self.inner.lock().await.keystore.client_id()
    }

    /// True iff the handshake completed and the key exchange reports
    /// an established context.
    pub async fn is_active(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.kex.is_established() && self.active.read().await.is_some()
    }

    /// Current status phrase.
    pub async fn status(&self) -> String {
        self.status.read().await.to_string()
    }

    /// Discard the shared context and any pending handshake state.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.kex.reset();
        *self.active.write().await = None;
        *self.status.write().await = SessionStatus::Reset;
        tracing::info!("session reset");
    }

    /// Delete the persisted identity and invalidate the session.
    pub async fn clear_identity(&self) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        inner.kex.reset();
        *self.active.write().await = None;
        *self.status.write().await = SessionStatus::Reset;
        inner.keystore.clear()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
