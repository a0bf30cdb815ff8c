//! Schema reconciler.
//!
//! Schema statements carry trailing semicolons; existing deployments'
//! audit tooling matches on the exact text, so the terminator stays.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sqlward_backend::{BackendHandle, Dialect, Statement};
use sqlward_core::{ConnectionDetails, Observation, Operation, ResourceKind};

use crate::error::{Error, Result};
use crate::kind::{scan_optional, ManagedKind};

const OBSERVE_SCHEMA: &str = "SELECT r.rolname FROM pg_namespace n \
     LEFT JOIN pg_roles r ON n.nspowner = r.oid WHERE n.nspname = $1";

const REVOKE_PUBLIC: &str = "REVOKE ALL ON SCHEMA PUBLIC FROM PUBLIC;";

/// Desired schema attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSpec {
    /// Owning role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Whether to revoke the default PUBLIC grant on the PUBLIC schema.
    /// Write-only: not observable, re-issued whenever statements run.
    #[serde(default)]
    pub revoke_public_on_schema: bool,
}

/// Statements bringing a schema into existence.
#[must_use]
pub fn create_statements(dialect: Dialect, name: &str, spec: &SchemaSpec) -> Vec<Statement> {
    let mut sql = format!("CREATE SCHEMA IF NOT EXISTS {}", dialect.quote_identifier(name));
    if let Some(role) = &spec.role {
        sql.push_str(&format!(" AUTHORIZATION {}", dialect.quote_identifier(role)));
    }
    sql.push(';');

    let mut statements = vec![Statement::new(sql)];
    if spec.revoke_public_on_schema {
        statements.push(Statement::new(REVOKE_PUBLIC));
    }
    statements
}

/// Statements adjusting an existing schema. Empty unless an owning role is
/// specified.
#[must_use]
pub fn update_statements(dialect: Dialect, name: &str, spec: &SchemaSpec) -> Vec<Statement> {
    let Some(role) = &spec.role else {
        return Vec::new();
    };
    let mut statements = vec![Statement::new(format!(
        "ALTER SCHEMA {} OWNER TO {};",
        dialect.quote_identifier(name),
        dialect.quote_identifier(role)
    ))];
    if spec.revoke_public_on_schema {
        statements.push(Statement::new(REVOKE_PUBLIC));
    }
    statements
}

/// Statement removing a schema.
#[must_use]
pub fn delete_statement(dialect: Dialect, name: &str) -> Statement {
    Statement::new(format!(
        "DROP SCHEMA IF EXISTS {};",
        dialect.quote_identifier(name)
    ))
}

/// Schema reconciler for postgres-wire backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct Schema;

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn run(
        &self,
        handle: &dyn BackendHandle,
        operation: Operation,
        statements: Vec<Statement>,
    ) -> Result<()> {
        let result = match statements.as_slice() {
            [] => return Ok(()),
            // Create plus revoke must be observed as one atomic step.
            [single] => handle.exec(single).await,
            batch => handle.exec_tx(batch).await,
        };
        result.map_err(|e| Error::statement(ResourceKind::Schema, operation, e))
    }
}

#[async_trait]
impl ManagedKind for Schema {
    type Spec = SchemaSpec;
    type Status = ();

    fn kind(&self) -> ResourceKind {
        ResourceKind::Schema
    }

    async fn observe(
        &self,
        handle: &dyn BackendHandle,
        name: &str,
        spec: &mut SchemaSpec,
        _status: &(),
    ) -> Result<Observation> {
        let query = Statement::new(OBSERVE_SCHEMA).bind(name);
        let Some(row) = scan_optional(handle, ResourceKind::Schema, &query).await? else {
            return Ok(Observation::absent());
        };

        let observed_owner = row
            .get_opt_string(0)
            .map_err(|e| Error::statement(ResourceKind::Schema, Operation::Observe, e))?;

        let mut late_initialized = false;
        if spec.role.is_none() {
            if let Some(owner) = &observed_owner {
                spec.role = Some(owner.clone());
                late_initialized = true;
            }
        }

        let up_to_date = match &spec.role {
            None => true,
            Some(role) => observed_owner.as_deref() == Some(role.as_str()),
        };

        Ok(Observation {
            exists: true,
            late_initialized,
            up_to_date,
        })
    }

    async fn create(
        &self,
        handle: &dyn BackendHandle,
        name: &str,
        spec: &SchemaSpec,
        _status: &mut (),
    ) -> Result<Option<ConnectionDetails>> {
        let statements = create_statements(handle.dialect(), name, spec);
        self.run(handle, Operation::Create, statements).await?;
        Ok(None)
    }

    async fn update(
        &self,
        handle: &dyn BackendHandle,
        name: &str,
        spec: &SchemaSpec,
        _status: &mut (),
    ) -> Result<Option<ConnectionDetails>> {
        let statements = update_statements(handle.dialect(), name, spec);
        self.run(handle, Operation::Update, statements).await?;
        Ok(None)
    }

    async fn delete(
        &self,
        handle: &dyn BackendHandle,
        name: &str,
        _spec: &SchemaSpec,
    ) -> Result<()> {
        self.run(
            handle,
            Operation::Delete,
            vec![delete_statement(handle.dialect(), name)],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_statements_exact_text() {
        let spec = SchemaSpec {
            role: Some("app_owner".to_string()),
            revoke_public_on_schema: true,
        };
        let statements = create_statements(Dialect::Postgres, "reporting", &spec);
        let sql: Vec<&str> = statements.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(
            sql,
            vec![
                "CREATE SCHEMA IF NOT EXISTS \"reporting\" AUTHORIZATION \"app_owner\";",
                "REVOKE ALL ON SCHEMA PUBLIC FROM PUBLIC;",
            ]
        );
    }

    #[test]
    fn test_create_without_role_or_revoke() {
        let statements = create_statements(Dialect::Postgres, "reporting", &SchemaSpec::default());
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].sql, "CREATE SCHEMA IF NOT EXISTS \"reporting\";");
    }

    #[test]
    fn test_update_statements() {
        let spec = SchemaSpec {
            role: Some("app_owner".to_string()),
            revoke_public_on_schema: false,
        };
        let statements = update_statements(Dialect::Postgres, "reporting", &spec);
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].sql,
            "ALTER SCHEMA \"reporting\" OWNER TO \"app_owner\";"
        );

        // No owning role means nothing to update.
        let statements = update_statements(Dialect::Postgres, "reporting", &SchemaSpec::default());
        assert!(statements.is_empty());
    }

    #[test]
    fn test_delete_statement() {
        assert_eq!(
            delete_statement(Dialect::Postgres, "reporting").sql,
            "DROP SCHEMA IF EXISTS \"reporting\";"
        );
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let spec = SchemaSpec {
            role: Some("app_owner".to_string()),
            revoke_public_on_schema: true,
        };
        assert_eq!(
            create_statements(Dialect::Postgres, "reporting", &spec),
            create_statements(Dialect::Postgres, "reporting", &spec)
        );
    }
}
