//! Credential resolution and rotation detection.
//!
//! A role's desired password lives in a referenced secret key; the
//! currently effective password, if any, is published in an output secret.
//! The resolver reads both and reports whether a rotation is pending. A
//! missing output secret is not an error: the role may not exist yet.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::{SecretError, SecretKeyRef, SecretStore};

/// Outcome of resolving a desired password against the published one.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedPassword {
    /// The desired password. Empty when no secret reference is configured.
    pub password: String,
    /// Whether the desired password differs from the published one.
    pub changed: bool,
}

impl std::fmt::Debug for ResolvedPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedPassword")
            .field("password", &"[REDACTED]")
            .field("changed", &self.changed)
            .finish()
    }
}

impl ResolvedPassword {
    /// Resolution for a role with no managed password.
    #[must_use]
    pub fn unmanaged() -> Self {
        Self {
            password: String::new(),
            changed: false,
        }
    }
}

/// Resolves desired passwords and detects rotations through a [`SecretStore`].
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn SecretStore>,
}

impl CredentialResolver {
    /// Create a resolver over a secret store.
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Resolve the desired password and compare it against the published one.
    ///
    /// - No desired reference: no managed password, `("", false)`.
    /// - No published reference, or published secret absent: nothing to
    ///   compare against, `changed = false` — but the resolved password is
    ///   still returned so a create can use it.
    /// - Otherwise `changed` is true iff the desired password is non-empty
    ///   and differs from the published value.
    #[instrument(skip_all)]
    pub async fn resolve(
        &self,
        desired: Option<&SecretKeyRef>,
        published: Option<&SecretKeyRef>,
    ) -> Result<ResolvedPassword, SecretError> {
        let Some(desired) = desired else {
            return Ok(ResolvedPassword::unmanaged());
        };

        let password = self.read_key(desired).await?;

        let Some(published) = published else {
            return Ok(ResolvedPassword {
                password,
                changed: false,
            });
        };

        let current = match self.store.get(&published.namespace, &published.name).await {
            Ok(data) => data
                .get(&published.key)
                .map(|v| String::from_utf8_lossy(v).into_owned()),
            Err(SecretError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        let changed = match current {
            Some(current) => !password.is_empty() && password != current,
            None => false,
        };
        if changed {
            debug!("password rotation pending");
        }

        Ok(ResolvedPassword { password, changed })
    }

    async fn read_key(&self, reference: &SecretKeyRef) -> Result<String, SecretError> {
        let data = self.store.get(&reference.namespace, &reference.name).await?;
        let value = data
            .get(&reference.key)
            .ok_or_else(|| SecretError::InvalidValue {
                namespace: reference.namespace.clone(),
                name: reference.name.clone(),
                key: reference.key.clone(),
                detail: "key not present in secret".to_string(),
            })?;
        String::from_utf8(value.clone()).map_err(|_| SecretError::InvalidValue {
            namespace: reference.namespace.clone(),
            name: reference.name.clone(),
            key: reference.key.clone(),
            detail: "value is not valid UTF-8".to_string(),
        })
    }
}
