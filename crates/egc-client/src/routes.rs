//! Endpoint classification.
//!
//! A pure prefix table deciding whether a request path must be
//! encrypted or must stay plaintext. Loaded once at startup,
//! overridable from configuration, never mutated by request traffic.

/// Classification of a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Forwarded verbatim (health, docs, and the handshake itself)
    Plaintext,
    /// Wrapped in an encrypted envelope
    Encrypted,
}

/// Path prefixes exempt from encryption.
///
/// The handshake endpoint is always plaintext: it bootstraps the very
/// session that would otherwise encrypt it.
const DEFAULT_PLAINTEXT_PREFIXES: &[&str] = &[
    "health",
    "gateway/status",
    "gateway/metrics",
    "docs",
    "redoc",
    "openapi.json",
    "handshake",
];

/// Ordered set of plaintext-exempt path prefixes.
#[derive(Debug, Clone)]
pub struct RouteTable {
    plaintext_prefixes: Vec<String>,
}

impl RouteTable {
    /// The default table.
    pub fn new() -> Self {
        Self {
            plaintext_prefixes: DEFAULT_PLAINTEXT_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }

    /// The default table plus extra exempt prefixes from configuration.
    pub fn with_extra_prefixes<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for prefix in extra {
            let normalized = prefix.as_ref().trim_start_matches('/').to_string();
            if !normalized.is_empty() && !table.plaintext_prefixes.contains(&normalized) {
                table.plaintext_prefixes.push(normalized);
            }
        }
        table
    }

    /// Classify a request path.
    ///
    /// Pure and deterministic: strips the leading slash, then matches
    /// case-sensitively against the exempt prefixes, anchored at the
    /// path start only. Checked before every request because callers
    /// pass raw paths with varying normalization.
    pub fn classify(&self, path: &str) -> RouteClass {
        let path = path.trim_start_matches('/');
        if self
            .plaintext_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            RouteClass::Plaintext
        } else {
            RouteClass::Encrypted
        }
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}
