//! Extension reconciler.
//!
//! Update is deliberately a no-op: version changes are accepted as desired
//! state but never mutated in place. Extensions are rarely upgraded in
//! place and an automatic `ALTER EXTENSION ... UPDATE` can run arbitrary
//! migration scripts; a version drift is logged instead.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use sqlward_backend::{BackendHandle, Dialect, Statement};
use sqlward_core::{ConnectionDetails, Observation, Operation, ResourceKind};

use crate::error::{Error, Result};
use crate::kind::{scan_optional, ManagedKind};

const OBSERVE_EXTENSION: &str = "SELECT extversion FROM pg_extension WHERE extname = $1";

/// Desired extension attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionSpec {
    /// Extension version. Installed as requested; never upgraded in place.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Statement installing an extension.
#[must_use]
pub fn create_statement(dialect: Dialect, name: &str, spec: &ExtensionSpec) -> Statement {
    let mut sql = format!(
        "CREATE EXTENSION IF NOT EXISTS {}",
        dialect.quote_identifier(name)
    );
    if let Some(version) = &spec.version {
        sql.push_str(&format!(" WITH VERSION {}", dialect.quote_identifier(version)));
    }
    Statement::new(sql)
}

/// Statement removing an extension.
#[must_use]
pub fn delete_statement(dialect: Dialect, name: &str) -> Statement {
    Statement::new(format!(
        "DROP EXTENSION IF EXISTS {}",
        dialect.quote_identifier(name)
    ))
}

/// Extension reconciler for postgres-wire backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct Extension;

impl Extension {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ManagedKind for Extension {
    type Spec = ExtensionSpec;
    type Status = ();

    fn kind(&self) -> ResourceKind {
        ResourceKind::Extension
    }

    async fn observe(
        &self,
        handle: &dyn BackendHandle,
        name: &str,
        spec: &mut ExtensionSpec,
        _status: &(),
    ) -> Result<Observation> {
        let query = Statement::new(OBSERVE_EXTENSION).bind(name);
        let Some(row) = scan_optional(handle, ResourceKind::Extension, &query).await? else {
            return Ok(Observation::absent());
        };

        let observed_version = row
            .get_string(0)
            .map_err(|e| Error::statement(ResourceKind::Extension, Operation::Observe, e))?;

        let mut late_initialized = false;
        if spec.version.is_none() {
            spec.version = Some(observed_version.clone());
            late_initialized = true;
        }

        if spec.version.as_deref() != Some(observed_version.as_str()) {
            warn!(
                extension = name,
                installed = %observed_version,
                desired = spec.version.as_deref().unwrap_or(""),
                "extension version drift; in-place upgrades are not applied"
            );
        }

        // An installed extension is always up to date: update never issues
        // statements, so reporting drift as divergence would loop forever.
        Ok(Observation {
            exists: true,
            late_initialized,
            up_to_date: true,
        })
    }

    async fn create(
        &self,
        handle: &dyn BackendHandle,
        name: &str,
        spec: &ExtensionSpec,
        _status: &mut (),
    ) -> Result<Option<ConnectionDetails>> {
        handle
            .exec(&create_statement(handle.dialect(), name, spec))
            .await
            .map_err(|e| Error::statement(ResourceKind::Extension, Operation::Create, e))?;
        Ok(None)
    }

    async fn update(
        &self,
        _handle: &dyn BackendHandle,
        _name: &str,
        _spec: &ExtensionSpec,
        _status: &mut (),
    ) -> Result<Option<ConnectionDetails>> {
        // Documented no-op.
        Ok(None)
    }

    async fn delete(
        &self,
        handle: &dyn BackendHandle,
        name: &str,
        _spec: &ExtensionSpec,
    ) -> Result<()> {
        handle
            .exec(&delete_statement(handle.dialect(), name))
            .await
            .map_err(|e| Error::statement(ResourceKind::Extension, Operation::Delete, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_statement_with_version() {
        let spec = ExtensionSpec {
            version: Some("1.2".to_string()),
        };
        assert_eq!(
            create_statement(Dialect::Postgres, "pgcrypto", &spec).sql,
            "CREATE EXTENSION IF NOT EXISTS \"pgcrypto\" WITH VERSION \"1.2\""
        );
    }

    #[test]
    fn test_create_statement_without_version() {
        assert_eq!(
            create_statement(Dialect::Postgres, "pgcrypto", &ExtensionSpec::default()).sql,
            "CREATE EXTENSION IF NOT EXISTS \"pgcrypto\""
        );
    }

    #[test]
    fn test_delete_statement() {
        assert_eq!(
            delete_statement(Dialect::Postgres, "pgcrypto").sql,
            "DROP EXTENSION IF EXISTS \"pgcrypto\""
        );
    }
}
