//! Plain HTTP transport collaborator.
//!
//! The router and session layer speak to the gateway through the
//! `HttpTransport` trait; `ReqwestTransport` is the real
//! implementation, tests substitute in-process doubles.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::errors::ClientError;

/// HTTP method subset used by the gateway API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// Raw response from the plain transport: status code plus body text.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Arbitrary HTTP client seam.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request with an optional JSON body and return the raw
    /// response. Transport-level failures (connection refused, DNS)
    /// map to `Network`; elapsed deadlines map to `Timeout`.
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<TransportResponse, ClientError>;
}

/// reqwest-backed transport with rustls and a per-request timeout.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<TransportResponse, ClientError> {
        let mut request = match method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
            Method::Delete => self.client.delete(url),
        };
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout
            } else {
                ClientError::Network(e.to_string())
            }
        })?;

        let status: StatusCode = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(TransportResponse {
            status: status.as_u16(),
            body,
        })
    }
}
