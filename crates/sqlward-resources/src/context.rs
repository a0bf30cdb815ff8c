//! Provider connection context.
//!
//! Resolved once per reconcile invocation: provider credentials come out of
//! a secret, a [`ConnectionConfig`] is built, and the dialect-appropriate
//! handle is connected. The context is discarded when the invocation
//! completes; no handle survives across invocations.

use std::str;

use tracing::instrument;

use sqlward_backend::{connect, BackendHandle, ConnectionConfig, Dialect, SslMode};
use sqlward_core::{details, ConnectionDetails};
use sqlward_secrets::SecretStore;

use crate::error::{Error, Result};

/// Secret keys a provider connection secret is expected to carry.
mod keys {
    pub const HOST: &str = "host";
    pub const PORT: &str = "port";
    pub const DATABASE: &str = "database";
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const SSL_MODE: &str = "sslmode";
}

/// Connection context for one reconcile invocation.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    config: ConnectionConfig,
}

impl ProviderContext {
    /// Build a context from an already-resolved configuration.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Resolve the context from a provider connection secret.
    ///
    /// Required keys: `host`, `database`, `username`. Optional: `port`,
    /// `password`, `sslmode`.
    #[instrument(skip(store))]
    pub async fn from_secret(
        store: &dyn SecretStore,
        dialect: Dialect,
        namespace: &str,
        name: &str,
    ) -> Result<Self> {
        let data = store.get(namespace, name).await.map_err(Error::secret)?;

        let get = |key: &str| -> Result<String> {
            let value = data
                .get(key)
                .ok_or_else(|| Error::invalid_spec(format!("provider secret is missing '{key}'")))?;
            str::from_utf8(value).map(str::to_owned).map_err(|_| {
                Error::invalid_spec(format!("provider secret key '{key}' is not UTF-8"))
            })
        };

        let mut config = ConnectionConfig::new(
            dialect,
            get(keys::HOST)?,
            get(keys::DATABASE)?,
            get(keys::USERNAME)?,
        );

        if let Some(port) = data.get(keys::PORT) {
            let port = str::from_utf8(port)
                .ok()
                .and_then(|p| p.parse::<u16>().ok())
                .ok_or_else(|| Error::invalid_spec("provider secret key 'port' is not a port"))?;
            config = config.with_port(port);
        }
        if data.contains_key(keys::PASSWORD) {
            config = config.with_password(get(keys::PASSWORD)?);
        }
        if let Some(mode) = data.get(keys::SSL_MODE) {
            let mode = str::from_utf8(mode)
                .ok()
                .and_then(SslMode::parse)
                .ok_or_else(|| {
                    Error::invalid_spec("provider secret key 'sslmode' is not a known mode")
                })?;
            config = config.with_ssl_mode(mode);
        }

        Ok(Self { config })
    }

    /// The resolved configuration.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Connect the dialect-appropriate handle.
    pub async fn connect(&self) -> Result<Box<dyn BackendHandle>> {
        connect(&self.config).await.map_err(Error::connection)
    }

    /// Seed details for published connection secrets: endpoint and target
    /// database, everything except per-object credentials.
    #[must_use]
    pub fn connection_details(&self) -> ConnectionDetails {
        let mut seed = ConnectionDetails::new();
        seed.insert(details::HOST.to_string(), self.config.host.clone());
        seed.insert(
            details::PORT.to_string(),
            self.config.effective_port().to_string(),
        );
        seed.insert(details::DATABASE.to_string(), self.config.database.clone());
        seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlward_secrets::{SecretData, StaticSecretStore};

    fn provider_secret(pairs: &[(&str, &str)]) -> StaticSecretStore {
        let store = StaticSecretStore::new();
        let data: SecretData = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.as_bytes().to_vec()))
            .collect();
        store.put("prod", "provider-conn", data);
        store
    }

    #[tokio::test]
    async fn test_from_secret_resolves_full_config() {
        let store = provider_secret(&[
            ("host", "db.internal"),
            ("port", "5433"),
            ("database", "app"),
            ("username", "provider"),
            ("password", "hunter2"),
            ("sslmode", "verify-full"),
        ]);

        let context =
            ProviderContext::from_secret(&store, Dialect::Postgres, "prod", "provider-conn")
                .await
                .unwrap();
        let config = context.config();
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.effective_port(), 5433);
        assert_eq!(config.ssl_mode, SslMode::VerifyFull);
        assert_eq!(config.password.as_deref(), Some("hunter2"));
    }

    #[tokio::test]
    async fn test_from_secret_missing_key_is_invalid() {
        let store = provider_secret(&[("host", "db.internal")]);
        let err = ProviderContext::from_secret(&store, Dialect::Postgres, "prod", "provider-conn")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSpec { .. }));
    }

    #[tokio::test]
    async fn test_from_secret_missing_secret_is_fatal() {
        let store = StaticSecretStore::new();
        let err = ProviderContext::from_secret(&store, Dialect::Postgres, "prod", "provider-conn")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Secret { .. }));
    }

    #[test]
    fn test_seed_details() {
        let context = ProviderContext::new(
            ConnectionConfig::new(Dialect::Cockroach, "db.internal", "app", "provider"),
        );
        let seed = context.connection_details();
        assert_eq!(seed.get(details::HOST).map(String::as_str), Some("db.internal"));
        assert_eq!(seed.get(details::PORT).map(String::as_str), Some("26257"));
        assert_eq!(seed.get(details::DATABASE).map(String::as_str), Some("app"));
        assert!(!seed.contains_key(details::PASSWORD));
    }
}
