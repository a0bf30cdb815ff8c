//! Grant reconciler.
//!
//! Two shapes share the kind: database-privilege grants and role membership.
//! A spec picks exactly one. Updates re-issue REVOKE followed by GRANT inside
//! a single transaction so observers never see the role stripped without the
//! replacement applied.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sqlward_backend::{BackendHandle, Dialect, Statement};
use sqlward_core::{ConnectionDetails, Observation, Operation, ResourceKind};

use crate::error::{Error, Result};
use crate::kind::{scan_all, scan_optional, ManagedKind};

const OBSERVE_DATABASE: &str = "SELECT a.privilege_type, a.is_grantable \
     FROM pg_database d \
     CROSS JOIN LATERAL aclexplode(d.datacl) a \
     JOIN pg_roles grantee ON a.grantee = grantee.oid \
     WHERE d.datname = $1 AND grantee.rolname = $2";

const OBSERVE_MEMBERSHIP: &str = "SELECT m.admin_option \
     FROM pg_auth_members m \
     JOIN pg_roles member ON m.member = member.oid \
     JOIN pg_roles target ON m.roleid = target.oid \
     WHERE member.rolname = $1 AND target.rolname = $2";

/// Desired grant, either database privileges or role membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantSpec {
    /// Grantee role.
    pub role: String,

    /// Database the privileges apply to. Mutually exclusive with `member_of`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Privileges to grant on the database.
    #[serde(default)]
    pub privileges: Vec<String>,

    /// Role to add the grantee to. Mutually exclusive with `database`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_of: Option<String>,

    /// WITH GRANT OPTION for database grants, WITH ADMIN OPTION for
    /// membership grants.
    #[serde(default)]
    pub with_option: bool,
}

enum Shape<'a> {
    Database(&'a str),
    Membership(&'a str),
}

fn shape(spec: &GrantSpec) -> Result<Shape<'_>> {
    match (&spec.database, &spec.member_of) {
        (Some(db), None) => {
            if spec.privileges.is_empty() {
                return Err(Error::invalid_spec(
                    "database grants require at least one privilege",
                ));
            }
            for privilege in &spec.privileges {
                if privilege.is_empty()
                    || !privilege.chars().all(|c| c.is_ascii_uppercase() || c == ' ')
                {
                    return Err(Error::invalid_spec(format!(
                        "'{privilege}' is not a recognized privilege"
                    )));
                }
            }
            Ok(Shape::Database(db))
        }
        (None, Some(target)) => Ok(Shape::Membership(target)),
        _ => Err(Error::invalid_spec(
            "a grant names exactly one of a database or a role to join",
        )),
    }
}

/// GRANT statement for whichever shape the desired grant takes.
pub fn grant_statement(dialect: Dialect, spec: &GrantSpec) -> Result<Statement> {
    let sql = match shape(spec)? {
        Shape::Database(db) => {
            let mut sql = format!(
                "GRANT {} ON DATABASE {} TO {}",
                spec.privileges.join(", "),
                dialect.quote_identifier(db),
                dialect.quote_identifier(&spec.role)
            );
            if spec.with_option {
                sql.push_str(" WITH GRANT OPTION");
            }
            sql
        }
        Shape::Membership(target) => {
            let mut sql = format!(
                "GRANT {} TO {}",
                dialect.quote_identifier(target),
                dialect.quote_identifier(&spec.role)
            );
            if spec.with_option {
                sql.push_str(" WITH ADMIN OPTION");
            }
            sql
        }
    };
    Ok(Statement::new(sql))
}

/// REVOKE statement undoing the desired grant.
pub fn revoke_statement(dialect: Dialect, spec: &GrantSpec) -> Result<Statement> {
    let sql = match shape(spec)? {
        Shape::Database(db) => format!(
            "REVOKE ALL ON DATABASE {} FROM {}",
            dialect.quote_identifier(db),
            dialect.quote_identifier(&spec.role)
        ),
        Shape::Membership(target) => format!(
            "REVOKE {} FROM {}",
            dialect.quote_identifier(target),
            dialect.quote_identifier(&spec.role)
        ),
    };
    Ok(Statement::new(sql))
}

/// Grant reconciler for postgres-wire backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct Grant;

impl Grant {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Revoke-then-grant inside one transaction.
    async fn reissue(
        &self,
        handle: &dyn BackendHandle,
        operation: Operation,
        spec: &GrantSpec,
    ) -> Result<()> {
        let dialect = handle.dialect();
        let statements = vec![revoke_statement(dialect, spec)?, grant_statement(dialect, spec)?];
        handle
            .exec_tx(&statements)
            .await
            .map_err(|e| Error::statement(ResourceKind::Grant, operation, e))
    }
}

#[async_trait]
impl ManagedKind for Grant {
    type Spec = GrantSpec;
    type Status = ();

    fn kind(&self) -> ResourceKind {
        ResourceKind::Grant
    }

    async fn observe(
        &self,
        handle: &dyn BackendHandle,
        _name: &str,
        spec: &mut GrantSpec,
        _status: &(),
    ) -> Result<Observation> {
        match shape(spec)? {
            Shape::Database(db) => {
                let query = Statement::new(OBSERVE_DATABASE).bind(db).bind(&spec.role);
                let rows = scan_all(handle, ResourceKind::Grant, &query).await?;
                if rows.is_empty() {
                    return Ok(Observation::absent());
                }

                let mut observed = BTreeSet::new();
                let mut all_grantable = true;
                for row in &rows {
                    let privilege = row.get_string(0).map_err(|e| {
                        Error::statement(ResourceKind::Grant, Operation::Observe, e)
                    })?;
                    let grantable = row.get_bool(1).map_err(|e| {
                        Error::statement(ResourceKind::Grant, Operation::Observe, e)
                    })?;
                    observed.insert(privilege);
                    all_grantable &= grantable;
                }
                let up_to_date = spec
                    .privileges
                    .iter()
                    .all(|privilege| observed.contains(privilege))
                    && (!spec.with_option || all_grantable);

                Ok(Observation {
                    exists: true,
                    late_initialized: false,
                    up_to_date,
                })
            }
            Shape::Membership(target) => {
                let query = Statement::new(OBSERVE_MEMBERSHIP)
                    .bind(&spec.role)
                    .bind(target);
                let row = scan_optional(handle, ResourceKind::Grant, &query).await?;
                match row {
                    None => Ok(Observation::absent()),
                    Some(row) => {
                        let admin = row.get_bool(0).map_err(|e| {
                            Error::statement(ResourceKind::Grant, Operation::Observe, e)
                        })?;
                        Ok(Observation {
                            exists: true,
                            late_initialized: false,
                            up_to_date: !spec.with_option || admin,
                        })
                    }
                }
            }
        }
    }

    async fn create(
        &self,
        handle: &dyn BackendHandle,
        _name: &str,
        spec: &GrantSpec,
        _status: &mut (),
    ) -> Result<Option<ConnectionDetails>> {
        let statement = grant_statement(handle.dialect(), spec)?;
        handle
            .exec(&statement)
            .await
            .map_err(|e| Error::statement(ResourceKind::Grant, Operation::Create, e))?;
        Ok(None)
    }

    async fn update(
        &self,
        handle: &dyn BackendHandle,
        _name: &str,
        spec: &GrantSpec,
        _status: &mut (),
    ) -> Result<Option<ConnectionDetails>> {
        self.reissue(handle, Operation::Update, spec).await?;
        Ok(None)
    }

    async fn delete(
        &self,
        handle: &dyn BackendHandle,
        _name: &str,
        spec: &GrantSpec,
    ) -> Result<()> {
        let statement = revoke_statement(handle.dialect(), spec)?;
        handle
            .exec(&statement)
            .await
            .map_err(|e| Error::statement(ResourceKind::Grant, Operation::Delete, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn database_spec() -> GrantSpec {
        GrantSpec {
            role: "app_reader".to_string(),
            database: Some("appdb".to_string()),
            privileges: vec!["CONNECT".to_string(), "TEMPORARY".to_string()],
            member_of: None,
            with_option: false,
        }
    }

    fn membership_spec() -> GrantSpec {
        GrantSpec {
            role: "app_reader".to_string(),
            database: None,
            privileges: Vec::new(),
            member_of: Some("readers".to_string()),
            with_option: false,
        }
    }

    #[test]
    fn test_database_grant_statement() {
        let statement = grant_statement(Dialect::Postgres, &database_spec()).unwrap();
        assert_eq!(
            statement.sql,
            "GRANT CONNECT, TEMPORARY ON DATABASE \"appdb\" TO \"app_reader\""
        );
    }

    #[test]
    fn test_database_grant_with_grant_option() {
        let mut spec = database_spec();
        spec.with_option = true;
        let statement = grant_statement(Dialect::Postgres, &spec).unwrap();
        assert!(statement.sql.ends_with("WITH GRANT OPTION"));
    }

    #[test]
    fn test_membership_grant_statement() {
        let statement = grant_statement(Dialect::Postgres, &membership_spec()).unwrap();
        assert_eq!(statement.sql, "GRANT \"readers\" TO \"app_reader\"");

        let mut spec = membership_spec();
        spec.with_option = true;
        let statement = grant_statement(Dialect::Postgres, &spec).unwrap();
        assert_eq!(
            statement.sql,
            "GRANT \"readers\" TO \"app_reader\" WITH ADMIN OPTION"
        );
    }

    #[test]
    fn test_revoke_statements() {
        let statement = revoke_statement(Dialect::Postgres, &database_spec()).unwrap();
        assert_eq!(
            statement.sql,
            "REVOKE ALL ON DATABASE \"appdb\" FROM \"app_reader\""
        );

        let statement = revoke_statement(Dialect::Postgres, &membership_spec()).unwrap();
        assert_eq!(statement.sql, "REVOKE \"readers\" FROM \"app_reader\"");
    }

    #[test]
    fn test_both_shapes_rejected() {
        let mut spec = database_spec();
        spec.member_of = Some("readers".to_string());
        assert!(grant_statement(Dialect::Postgres, &spec).is_err());

        let mut spec = database_spec();
        spec.database = None;
        assert!(grant_statement(Dialect::Postgres, &spec).is_err());
    }

    #[test]
    fn test_database_grant_requires_privileges() {
        let mut spec = database_spec();
        spec.privileges.clear();
        assert!(grant_statement(Dialect::Postgres, &spec).is_err());
    }
}
