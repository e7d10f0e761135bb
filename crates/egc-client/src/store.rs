//! Secret storage and the identity keystore.
//!
//! The secret store is an explicitly injected collaborator (no static
//! singletons): a file-backed implementation with restrictive
//! permissions for real deployments and an in-memory one for tests.
//! The identity keystore owns the long-lived signing identity and is
//! the only component that ever touches the private seed.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use egc_crypto::Identity;

use crate::errors::ClientError;

/// Storage key under which the identity seed lives.
const IDENTITY_KEY: &str = "identity";

/// Secure secret store collaborator.
///
/// Platform credential-manager equivalent; implementations must not
/// write values anywhere readable by other users.
pub trait SecretStore: Send + Sync {
    /// Read a stored value, None if absent.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, ClientError>;
    /// Write a value, replacing any previous one.
    fn write(&self, key: &str, value: &[u8]) -> Result<(), ClientError>;
    /// Delete a value. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), ClientError>;
}

/// File-based secret store with 0600 permissions and atomic writes.
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Default data directory for this installation.
    pub fn default_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "egc", "egc-client")
            .map(|dirs| dirs.data_dir().to_path_buf())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SecretStore for FileSecretStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, ClientError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .map_err(|e| ClientError::Store(e.to_string()))
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), ClientError> {
        fs::create_dir_all(&self.dir).map_err(|e| ClientError::Store(e.to_string()))?;

        let path = self.path_for(key);
        let temp_path = path.with_extension("tmp");

        let mut file =
            fs::File::create(&temp_path).map_err(|e| ClientError::Store(e.to_string()))?;
        file.write_all(value)
            .map_err(|e| ClientError::Store(e.to_string()))?;
        file.sync_all()
            .map_err(|e| ClientError::Store(e.to_string()))?;
        drop(file);

        fs::rename(&temp_path, &path).map_err(|e| ClientError::Store(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&path)
                .map_err(|e| ClientError::Store(e.to_string()))?
                .permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&path, perms).map_err(|e| ClientError::Store(e.to_string()))?;
        }

        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), ClientError> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| ClientError::Store(e.to_string()))?;
        }
        Ok(())
    }
}

/// In-memory secret store for tests.
#[derive(Default)]
pub struct MemorySecretStore {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, ClientError> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), ClientError> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), ClientError> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Serializable identity record for the secret store.
#[derive(Serialize, Deserialize)]
struct StoredIdentity {
    /// Version for future compatibility
    version: u32,
    /// Ed25519 seed, hex encoded
    seed: String,
    /// Unix seconds at creation
    created_at: u64,
}

impl StoredIdentity {
    const CURRENT_VERSION: u32 = 1;

    fn new(seed: &[u8; 32]) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            version: Self::CURRENT_VERSION,
            seed: hex::encode(seed),
            created_at,
        }
    }
}

/// Owns the long-lived signing identity.
///
/// Exactly one identity exists per installation: generated on first
/// run, loaded afterwards, destroyed only by an explicit `clear`. The
/// private seed never leaves this type except into the secret store.
pub struct IdentityKeyStore {
    store: Box<dyn SecretStore>,
    identity: Option<Identity>,
}

impl IdentityKeyStore {
    pub fn new(store: Box<dyn SecretStore>) -> Self {
        Self {
            store,
            identity: None,
        }
    }

    /// Load the persisted identity, generating and persisting a new one
    /// if absent. Idempotent.
    pub fn load_or_create(&mut self) -> Result<(), ClientError> {
        if self.identity.is_some() {
            return Ok(());
        }

        if let Some(bytes) = self.store.read(IDENTITY_KEY)? {
            let stored: StoredIdentity =
                serde_json::from_slice(&bytes).map_err(|e| ClientError::Store(e.to_string()))?;
            let seed = hex::decode(&stored.seed).map_err(|e| ClientError::Store(e.to_string()))?;
            let identity = Identity::from_seed(&seed)?;
            tracing::debug!(client_id = %identity.client_id(), "loaded existing identity");
            self.identity = Some(identity);
            return Ok(());
        }

        let identity = Identity::generate();
        let stored = StoredIdentity::new(&identity.seed());
        let bytes =
            serde_json::to_vec(&stored).map_err(|e| ClientError::Store(e.to_string()))?;
        self.store.write(IDENTITY_KEY, &bytes)?;

        tracing::info!(client_id = %identity.client_id(), "generated new identity");
        self.identity = Some(identity);
        Ok(())
    }

    /// The loaded identity, if any.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// The derived client identifier, if an identity is loaded.
    pub fn client_id(&self) -> Option<String> {
        self.identity.as_ref().map(|i| i.client_id())
    }

    /// Sign a challenge with the identity key.
    pub fn sign(&self, challenge: &[u8]) -> Result<[u8; 64], ClientError> {
        self.identity
            .as_ref()
            .map(|i| i.sign(challenge))
            .ok_or(ClientError::KeyUnavailable)
    }

    /// Delete the persisted identity and drop the in-memory handle.
    ///
    /// The session layer must be reset alongside this; `SessionManager`
    /// wires that up.
    pub fn clear(&mut self) -> Result<(), ClientError> {
        self.store.delete(IDENTITY_KEY)?;
        self.identity = None;
        tracing::info!("cleared identity keys");
        Ok(())
    }
}
