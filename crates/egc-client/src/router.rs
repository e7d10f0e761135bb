//! Transport router.
//!
//! Classifies every outgoing request by path and dispatches it either
//! verbatim (plaintext routes) or wrapped in an encrypted envelope.
//! There is no fallback from encrypted to plaintext on any path: an
//! encrypted-classified request without an established session fails
//! immediately, and a handshake is never triggered implicitly.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use egc_crypto::{open_payload, seal_payload};

use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::routes::{RouteClass, RouteTable};
use crate::session::SessionManager;
use crate::store::{FileSecretStore, IdentityKeyStore, SecretStore};
use crate::transport::{HttpTransport, Method, ReqwestTransport};

/// Client for the encrypted gateway API.
///
/// One router replaces the classify-then-route logic for every
/// endpoint; the typed `get`/`post`/`put`/`delete` helpers are thin
/// wrappers over `send`, not separate layers.
pub struct GatewayClient {
    base_url: String,
    routes: RouteTable,
    session: Arc<SessionManager>,
    transport: Arc<dyn HttpTransport>,
}

impl GatewayClient {
    /// Build a client from configuration plus injected collaborators.
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn HttpTransport>,
        store: Box<dyn SecretStore>,
    ) -> Self {
        let keystore = IdentityKeyStore::new(store);
        let session = Arc::new(SessionManager::new(
            keystore,
            transport.clone(),
            &config.gateway.base_url,
            &config.gateway.component,
            Duration::from_secs(config.gateway.timeout_seconds),
        ));
        let routes = RouteTable::with_extra_prefixes(&config.routes.plaintext_prefixes);
        Self::from_parts(&config.gateway.base_url, routes, session, transport)
    }

    /// Build a client from configuration with the default transport and
    /// file-backed secret store.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(
            config.gateway.timeout_seconds,
        ))?);
        let store_dir = config
            .identity
            .store_dir
            .clone()
            .or_else(FileSecretStore::default_dir)
            .ok_or_else(|| ClientError::Config("no data directory available".to_string()))?;
        let store = Box::new(FileSecretStore::new(store_dir));
        Ok(Self::new(config, transport, store))
    }

    /// Assemble a client from already-built parts (used by tests).
    pub fn from_parts(
        base_url: &str,
        routes: RouteTable,
        session: Arc<SessionManager>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            routes,
            session,
            transport,
        }
    }

    /// The session lifecycle handle; callers sequence `establish()`
    /// through this before issuing encrypted traffic.
    pub fn session(&self) -> Arc<SessionManager> {
        self.session.clone()
    }

    /// Classify a path against the route table.
    pub fn classify(&self, path: &str) -> RouteClass {
        self.routes.classify(path)
    }

    /// Send a request, dispatching on classification.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        query: &[(&str, &str)],
    ) -> Result<Value, ClientError> {
        let url = self.build_url(path, query);
        // Classification runs per request: callers pass raw paths with
        // varying normalization
        match self.routes.classify(path) {
            RouteClass::Plaintext => self.send_plaintext(method, &url, body.as_ref()).await,
            RouteClass::Encrypted => self.send_encrypted(method, &url, body).await,
        }
    }

    pub async fn get(&self, path: &str) -> Result<Value, ClientError> {
        self.send(Method::Get, path, None, &[]).await
    }

    pub async fn get_with_query(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, ClientError> {
        self.send(Method::Get, path, None, query).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        self.send(Method::Post, path, Some(body), &[]).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        self.send(Method::Put, path, Some(body), &[]).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ClientError> {
        self.send(Method::Delete, path, None, &[]).await
    }

    fn build_url(&self, path: &str, query: &[(&str, &str)]) -> String {
        let mut url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        if !query.is_empty() {
            let qs = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(query)
                .finish();
            url.push('?');
            url.push_str(&qs);
        }
        url
    }

    async fn send_plaintext(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, ClientError> {
        tracing::debug!(method = method.as_str(), url, "plaintext request");
        let response = self.transport.send(method, url, body).await?;
        let parsed = parse_body(&response.body);

        if !response.is_success() {
            return Err(ClientError::Api {
                status: response.status,
                body: parsed,
            });
        }
        Ok(parsed.unwrap_or(Value::Null))
    }

    async fn send_encrypted(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value, ClientError> {
        // Fails fast if no session is established; never triggers a
        // handshake from inside a request call
        let context = self.session.context().await?;
        let client_id = self
            .session
            .client_id()
            .await
            .ok_or(ClientError::KeyUnavailable)?;

        let payload = body.unwrap_or_else(|| json!({}));
        let blob = seal_payload(&context, &payload)?;
        let envelope = json!({
            "encrypted": true,
            "payload": blob,
            "client_id": client_id,
        });

        tracing::debug!(method = method.as_str(), url, "encrypted request");
        let response = self.transport.send(method, url, Some(&envelope)).await?;
        let parsed = parse_body(&response.body);

        // Decrypt envelope-shaped bodies even on error statuses so the
        // API error carries the real error payload; a plaintext body on
        // an encrypted route passes through untouched (e.g. a 401
        // rejected before the gateway could encrypt anything)
        let unwrapped = match parsed {
            Some(value) => match envelope_blob(&value) {
                Some(blob) => Some(open_payload(&context, blob)?),
                None => Some(value),
            },
            None => None,
        };

        if !response.is_success() {
            return Err(ClientError::Api {
                status: response.status,
                body: unwrapped,
            });
        }
        Ok(unwrapped.unwrap_or(Value::Null))
    }
}

/// Parse a response body: JSON where possible, raw string otherwise,
/// None when empty.
fn parse_body(body: &str) -> Option<Value> {
    if body.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(body) {
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(body.to_string())),
    }
}

/// Extract the ciphertext blob from an envelope-shaped value.
///
/// Deployed gateways have shipped the response ciphertext under both
/// `payload` and `encrypted_payload`; both spellings are accepted.
fn envelope_blob(value: &Value) -> Option<&str> {
    let obj = value.as_object()?;
    let flagged = obj.get("encrypted").and_then(Value::as_bool) == Some(true);
    let blob = obj
        .get("payload")
        .or_else(|| obj.get("encrypted_payload"))
        .and_then(Value::as_str)?;
    if flagged || obj.contains_key("encrypted_payload") {
        Some(blob)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySecretStore;
    use crate::transport::TransportResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingTransport {
        requests: Mutex<Vec<(Method, String, Option<Value>)>>,
        status: u16,
        body: String,
    }

    impl RecordingTransport {
        fn new(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                status,
                body: body.to_string(),
            })
        }

        fn count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpTransport for RecordingTransport {
        async fn send(
            &self,
            method: Method,
            url: &str,
            body: Option<&Value>,
        ) -> Result<TransportResponse, ClientError> {
            self.requests
                .lock()
                .unwrap()
                .push((method, url.to_string(), body.cloned()));
            Ok(TransportResponse {
                status: self.status,
                body: self.body.clone(),
            })
        }
    }

    fn client(transport: Arc<RecordingTransport>) -> GatewayClient {
        let keystore = IdentityKeyStore::new(Box::new(MemorySecretStore::new()));
        let session = Arc::new(SessionManager::new(
            keystore,
            transport.clone(),
            "http://gateway.test",
            "client",
            Duration::from_secs(5),
        ));
        GatewayClient::from_parts(
            "http://gateway.test",
            RouteTable::new(),
            session,
            transport,
        )
    }

    #[tokio::test]
    async fn test_plaintext_route_forwards_verbatim() {
        let transport = RecordingTransport::new(200, r#"{"status": "ok"}"#);
        let c = client(transport.clone());

        let result = c.get("/health").await.unwrap();
        assert_eq!(result, json!({"status": "ok"}));

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, Method::Get);
        assert_eq!(requests[0].1, "http://gateway.test/health");
        assert!(requests[0].2.is_none());
    }

    #[tokio::test]
    async fn test_encrypted_route_without_session_fails_fast() {
        let transport = RecordingTransport::new(200, "{}");
        let c = client(transport.clone());

        let err = c.post("/users", json!({"name": "ada"})).await.unwrap_err();
        assert!(matches!(err, ClientError::NoActiveSession));
        // Nothing may reach the wire
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test]
    async fn test_plaintext_non_2xx_maps_to_api_error() {
        let transport = RecordingTransport::new(503, r#"{"detail": "down"}"#);
        let c = client(transport);

        let err = c.get("/health").await.unwrap_err();
        match err {
            ClientError::Api { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, Some(json!({"detail": "down"})));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_query_params_are_encoded() {
        let transport = RecordingTransport::new(200, "{}");
        let c = client(transport.clone());

        c.get_with_query("/health", &[("q", "a b"), ("n", "1")])
            .await
            .unwrap();

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].1, "http://gateway.test/health?q=a+b&n=1");
    }

    #[tokio::test]
    async fn test_non_json_plaintext_body_passes_through_as_string() {
        let transport = RecordingTransport::new(200, "<html>docs</html>");
        let c = client(transport);

        let result = c.get("/docs").await.unwrap();
        assert_eq!(result, Value::String("<html>docs</html>".into()));
    }

    #[test]
    fn test_envelope_blob_accepts_both_field_names() {
        let with_payload = json!({"encrypted": true, "payload": "abc", "client_id": "x"});
        assert_eq!(envelope_blob(&with_payload), Some("abc"));

        let with_encrypted_payload = json!({"encrypted": true, "encrypted_payload": "def"});
        assert_eq!(envelope_blob(&with_encrypted_payload), Some("def"));

        let plain = json!({"detail": "unauthorized"});
        assert_eq!(envelope_blob(&plain), None);
    }

    #[test]
    fn test_parse_body_variants() {
        assert_eq!(parse_body(""), None);
        assert_eq!(parse_body("  "), None);
        assert_eq!(parse_body("{\"a\": 1}"), Some(json!({"a": 1})));
        assert_eq!(parse_body("plain text"), Some(Value::String("plain text".into())));
    }
}
