//! Client configuration.
//!
//! Loaded once at startup from TOML; no setting here changes at
//! runtime. Configuration is stored at the platform config dir
//! (`~/.config/egc/client.toml` on Unix).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::ClientError;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for ClientError {
    fn from(e: ConfigError) -> Self {
        ClientError::Config(e.to_string())
    }
}

/// Gateway client configuration
///
/// # Example TOML
///
/// ```toml
/// [gateway]
/// base_url = "https://gateway.example.com"
/// component = "client"
/// timeout_seconds = 30
///
/// [routes]
/// plaintext_prefixes = []
///
/// [identity]
/// store_dir = ""  # Empty = default location
///
/// [logging]
/// level = "warn"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub routes: RoutesConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Gateway endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the gateway
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Component tag sent in the handshake request
    #[serde(default = "default_component")]
    pub component: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_component() -> String {
    "client".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            component: default_component(),
            timeout_seconds: default_timeout(),
        }
    }
}

/// Route classification configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutesConfig {
    /// Extra plaintext-exempt path prefixes, added to the built-in set
    #[serde(default)]
    pub plaintext_prefixes: Vec<String>,
}

/// Identity storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Directory for the persisted identity key (empty = default location)
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location, falling back to
    /// defaults when no file exists
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from a custom path or the default location
    pub fn load_from(custom_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = custom_path {
            Self::load(path)
        } else {
            Self::load_default()
        }
    }

    /// Platform-specific default config file path
    ///
    /// - Unix: `~/.config/egc/client.toml`
    /// - Windows: `%APPDATA%\egc\client.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "egc", "egc-client")
            .map(|dirs| dirs.config_dir().join("client.toml"))
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.gateway.base_url.starts_with("http://")
            && !self.gateway.base_url.starts_with("https://")
        {
            return Err(ConfigError::ValidationError(format!(
                "invalid base_url '{}': must start with http:// or https://",
                self.gateway.base_url
            )));
        }

        if self.gateway.component.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "component must not be empty".to_string(),
            ));
        }

        if self.gateway.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "invalid log level '{}'. Valid values: {:?}",
                self.logging.level, valid_levels
            )));
        }

        Ok(())
    }

    /// Generate sample configuration file content
    pub fn sample_toml() -> &'static str {
        r#"# Encrypted gateway client configuration

[gateway]
# Base URL of the gateway
base_url = "http://127.0.0.1:8000"
# Component tag sent in the handshake request
component = "client"
# Request timeout in seconds
timeout_seconds = 30

[routes]
# Extra plaintext-exempt path prefixes (health, docs, and the
# handshake endpoint are always exempt)
plaintext_prefixes = []

[identity]
# Directory for the persisted identity key (empty = default location)
# store_dir = ""

[logging]
# Log level: "error", "warn", "info", "debug", "trace"
level = "warn"
"#
    }
}
