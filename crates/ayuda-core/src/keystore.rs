//! Gemini API key storage and credential resolution.

use std::sync::Arc;

use crate::storage::{Storage, StorageError};

/// Fixed storage slot for the user's Gemini API key
pub const API_KEY_STORAGE_KEY: &str = "@ayuda_gt_gemini_api_key";

/// Environment variable that takes precedence over the stored key
pub const API_KEY_ENV_VAR: &str = "GEMINI_API_KEY";

/// Persists the single application-wide API key.
///
/// The key format is never validated here; the remote service is the only judge.
#[derive(Clone)]
pub struct KeyStore {
    storage: Arc<dyn Storage>,
}

impl KeyStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Overwrites any previously saved key
    pub fn save(&self, key: &str) -> Result<(), StorageError> {
        self.storage.set_item(API_KEY_STORAGE_KEY, key)
    }

    /// Returns `None` when no key has been saved
    pub fn load(&self) -> Result<Option<String>, StorageError> {
        self.storage.get_item(API_KEY_STORAGE_KEY)
    }

    pub fn remove(&self) -> Result<(), StorageError> {
        self.storage.remove_item(API_KEY_STORAGE_KEY)
    }
}

/// Where a resolved credential came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Env,
    Stored,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Env => "env",
            CredentialSource::Stored => "stored",
        }
    }
}

/// Supplies the API key to the assistant client before every request.
pub trait CredentialProvider: Send + Sync {
    fn credential(&self) -> Option<String>;
}

impl CredentialProvider for KeyStore {
    fn credential(&self) -> Option<String> {
        match self.load() {
            Ok(key) => key.filter(|k| !k.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "could not read stored API key");
                None
            }
        }
    }
}

/// A fixed credential, mostly useful in tests and one-shot CLI runs
impl CredentialProvider for Option<String> {
    fn credential(&self) -> Option<String> {
        self.clone()
    }
}

/// Environment variable first, then the key store
#[derive(Clone)]
pub struct StoredCredentials {
    store: KeyStore,
    env_var: Option<String>,
}

impl StoredCredentials {
    pub fn new(store: KeyStore) -> Self {
        Self {
            store,
            env_var: Some(API_KEY_ENV_VAR.to_string()),
        }
    }

    /// Ignore the environment entirely
    pub fn without_env(store: KeyStore) -> Self {
        Self {
            store,
            env_var: None,
        }
    }

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    fn env_key(&self) -> Option<String> {
        let var = self.env_var.as_deref()?;
        std::env::var(var).ok().filter(|k| !k.trim().is_empty())
    }

    /// Resolve the key together with its source
    pub fn resolve(&self) -> Option<(String, CredentialSource)> {
        if let Some(key) = self.env_key() {
            return Some((key, CredentialSource::Env));
        }
        self.store
            .credential()
            .map(|key| (key, CredentialSource::Stored))
    }
}

impl CredentialProvider for StoredCredentials {
    fn credential(&self) -> Option<String> {
        self.resolve().map(|(key, _)| key)
    }
}

/// Mask a key for display: first and last four characters only
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "••••••••".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}••••••••••••{}", head, tail)
}
