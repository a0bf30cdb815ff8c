//! Secret store implementations.
//!
//! [`StaticSecretStore`] holds secrets in memory and backs tests and
//! single-process deployments. [`FileSecretStore`] reads the conventional
//! mount layout `<root>/<namespace>/<name>/<key>` where each key is a file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use crate::{SecretData, SecretError, SecretStore};

/// In-memory secret store.
#[derive(Debug, Default)]
pub struct StaticSecretStore {
    secrets: RwLock<HashMap<(String, String), SecretData>>,
}

impl StaticSecretStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a secret.
    pub fn put(&self, namespace: impl Into<String>, name: impl Into<String>, data: SecretData) {
        self.secrets
            .write()
            .expect("secret store lock poisoned")
            .insert((namespace.into(), name.into()), data);
    }

    /// Remove a secret.
    pub fn remove(&self, namespace: &str, name: &str) {
        self.secrets
            .write()
            .expect("secret store lock poisoned")
            .remove(&(namespace.to_string(), name.to_string()));
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<SecretData, SecretError> {
        self.secrets
            .read()
            .expect("secret store lock poisoned")
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| SecretError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}

/// Secret store over a directory of mounted secrets.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    root: PathBuf,
}

impl FileSecretStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<SecretData, SecretError> {
        let dir = self.root.join(namespace).join(name);
        if !dir.is_dir() {
            return Err(SecretError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }

        let entries = std::fs::read_dir(&dir).map_err(|e| SecretError::Unavailable {
            detail: format!("cannot read secret directory {}", dir.display()),
            source: Some(Box::new(e)),
        })?;

        let mut data = SecretData::new();
        for entry in entries {
            let entry = entry.map_err(|e| SecretError::Unavailable {
                detail: format!("cannot read secret directory {}", dir.display()),
                source: Some(Box::new(e)),
            })?;
            let path = entry.path();
            // Mount directories carry dot-prefixed bookkeeping entries.
            let key = match path.file_name().and_then(|n| n.to_str()) {
                Some(key) if !key.starts_with('.') => key.to_string(),
                _ => continue,
            };
            if !path.is_file() {
                continue;
            }
            let value = std::fs::read(&path).map_err(|e| SecretError::Unavailable {
                detail: format!("cannot read secret key {}", path.display()),
                source: Some(Box::new(e)),
            })?;
            data.insert(key, value);
        }

        debug!(namespace, name, keys = data.len(), "secret loaded from mount");
        Ok(data)
    }
}
