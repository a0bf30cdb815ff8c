//! Pluggable secret store abstraction for sqlward.
//!
//! This crate provides the [`SecretStore`] trait the credential resolver
//! reads through, two store implementations (in-memory, file mounts), and
//! the rotation-detection logic that decides whether a desired password
//! differs from the currently published one.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sqlward_secrets::{CredentialResolver, SecretKeyRef, StaticSecretStore};
//!
//! let resolver = CredentialResolver::new(Arc::new(store));
//! let resolved = resolver.resolve(Some(&desired_ref), Some(&published_ref)).await?;
//! if resolved.changed {
//!     // rotation pending: the role is not up to date
//! }
//! ```

pub mod resolver;
pub mod store;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// Re-exports
pub use resolver::{CredentialResolver, ResolvedPassword};
pub use store::{FileSecretStore, StaticSecretStore};

/// Errors returned by secret store operations.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// Secret not found in the store.
    #[error("secret not found: {namespace}/{name}")]
    NotFound { namespace: String, name: String },

    /// The secret exists but the referenced key is missing or malformed.
    #[error("invalid secret value for {namespace}/{name} key '{key}': {detail}")]
    InvalidValue {
        namespace: String,
        name: String,
        key: String,
        detail: String,
    },

    /// Store is unreachable (I/O error, permission failure).
    #[error("secret store unavailable: {detail}")]
    Unavailable {
        detail: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Key/value payload of one secret.
pub type SecretData = BTreeMap<String, Vec<u8>>;

/// Pointer to one key inside one secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeyRef {
    /// Namespace of the secret.
    pub namespace: String,
    /// Name of the secret.
    pub name: String,
    /// Key within the secret's data map.
    pub key: String,
}

impl SecretKeyRef {
    /// Create a new secret key reference.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            key: key.into(),
        }
    }
}

/// Read capability over a secret backend.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the key/value map of one secret.
    ///
    /// Returns [`SecretError::NotFound`] when the secret does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<SecretData, SecretError>;
}

/// Generate a random alphanumeric password.
///
/// Used when a role is created without a desired-password secret reference.
#[must_use]
pub fn generate_password() -> String {
    use rand::distributions::Alphanumeric;
    use rand::rngs::OsRng;
    use rand::Rng;

    OsRng
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}
