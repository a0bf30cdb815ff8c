//! Role reconciler.
//!
//! Privilege flags map to boolean clauses generated in one fixed order:
//! SUPERUSER, INHERIT, CREATEDB, CREATEROLE, LOGIN, REPLICATION, BYPASSRLS.
//! The clause list applied last is kept in status and compared positionally
//! on later cycles — the ordering is a compatibility contract, change it and
//! diffs silently break across upgrades.

use async_trait::async_trait;

use sqlward_backend::{BackendHandle, Statement};
use sqlward_core::{details, ConnectionDetails, Observation, Operation, ResourceKind};
use sqlward_secrets::{generate_password, CredentialResolver, ResolvedPassword, SecretKeyRef};

use crate::error::{Error, Result};
use crate::kind::{scan_optional, ManagedKind};

use serde::{Deserialize, Serialize};

const OBSERVE_ROLE: &str = "SELECT rolsuper, rolinherit, rolcreatedb, rolcreaterole, \
     rolcanlogin, rolreplication, rolbypassrls, rolconnlimit \
     FROM pg_roles WHERE rolname = $1";

/// Desired privilege flags. An unset flag emits no clause and the backend
/// default applies; a set flag emits `<CLAUSE>` or `NO<CLAUSE>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePrivileges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub super_user: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_db: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_role: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bypass_rls: Option<bool>,
}

/// One write-only configuration parameter (`ALTER ROLE ... SET name = value`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigurationParameter {
    pub name: String,
    pub value: String,
}

/// Desired role attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    /// Privilege flags.
    #[serde(default)]
    pub privileges: RolePrivileges,

    /// Connection limit; -1 means unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_limit: Option<i64>,

    /// Configuration parameters to apply. Not observable through the
    /// catalog; diffed against the status snapshot instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_parameters: Option<Vec<ConfigurationParameter>>,

    /// Secret holding the desired password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_secret_ref: Option<SecretKeyRef>,

    /// Secret where the currently effective password is published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_secret_ref: Option<SecretKeyRef>,
}

/// Applied-state snapshot carried across cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleStatus {
    /// Privilege clauses applied last, in synthesis order.
    #[serde(default)]
    pub privileges_as_clauses: Vec<String>,

    /// Connection limit applied last.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_limit: Option<i64>,

    /// Configuration parameters applied last.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_parameters: Option<Vec<ConfigurationParameter>>,
}

/// Map privilege flags to clauses in the fixed synthesis order.
///
/// These strings are never built from user input; they go into statements
/// verbatim.
#[must_use]
pub fn privileges_as_clauses(privileges: &RolePrivileges) -> Vec<String> {
    let mut clauses = Vec::new();
    push_clause(&mut clauses, "SUPERUSER", privileges.super_user);
    push_clause(&mut clauses, "INHERIT", privileges.inherit);
    push_clause(&mut clauses, "CREATEDB", privileges.create_db);
    push_clause(&mut clauses, "CREATEROLE", privileges.create_role);
    push_clause(&mut clauses, "LOGIN", privileges.login);
    push_clause(&mut clauses, "REPLICATION", privileges.replication);
    push_clause(&mut clauses, "BYPASSRLS", privileges.bypass_rls);
    clauses
}

fn push_clause(clauses: &mut Vec<String>, clause: &str, flag: Option<bool>) {
    match flag {
        Some(true) => clauses.push(clause.to_string()),
        Some(false) => clauses.push(format!("NO{clause}")),
        None => {}
    }
}

/// Positional diff of two clause lists.
///
/// Fails loudly when the existing list is shorter than the desired one: the
/// existing side does not cover every recognized clause (stale status after
/// an upgrade, freshly adopted role) and guessing would be unsafe.
pub fn changed_clauses(existing: &[String], desired: &[String]) -> Result<Vec<String>> {
    if existing.len() < desired.len() {
        return Err(Error::Comparison {
            observed: existing.len(),
            desired: desired.len(),
        });
    }
    Ok(desired
        .iter()
        .enumerate()
        .filter(|(index, clause)| existing[*index] != **clause)
        .map(|(_, clause)| clause.clone())
        .collect())
}

fn same_parameters(left: &[ConfigurationParameter], right: &[ConfigurationParameter]) -> bool {
    // Order-insensitive: RESET ALL plus re-apply makes order irrelevant.
    let mut left = left.to_vec();
    let mut right = right.to_vec();
    left.sort();
    right.sort();
    left == right
}

/// Role reconciler for postgres-wire backends.
#[derive(Default)]
pub struct Role {
    resolver: Option<CredentialResolver>,
}

impl Role {
    /// A role with no managed password.
    #[must_use]
    pub fn new() -> Self {
        Self { resolver: None }
    }

    /// A role whose password is managed through the given resolver.
    #[must_use]
    pub fn with_resolver(resolver: CredentialResolver) -> Self {
        Self {
            resolver: Some(resolver),
        }
    }

    async fn resolve(&self, spec: &RoleSpec) -> Result<ResolvedPassword> {
        match (&self.resolver, &spec.password_secret_ref) {
            (Some(resolver), Some(_)) => resolver
                .resolve(
                    spec.password_secret_ref.as_ref(),
                    spec.published_secret_ref.as_ref(),
                )
                .await
                .map_err(Error::secret),
            // Treating this as unmanaged would skip rotation detection
            // entirely and create the role with a random password instead
            // of the referenced one.
            (None, Some(_)) => Err(Error::invalid_spec(
                "role references a password secret but no credential resolver is configured",
            )),
            _ => Ok(ResolvedPassword::unmanaged()),
        }
    }

    async fn exec(
        &self,
        handle: &dyn BackendHandle,
        operation: Operation,
        statement: Statement,
    ) -> Result<()> {
        handle
            .exec(&statement)
            .await
            .map_err(|e| Error::statement(ResourceKind::Role, operation, e))
    }
}

#[async_trait]
impl ManagedKind for Role {
    type Spec = RoleSpec;
    type Status = RoleStatus;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Role
    }

    async fn observe(
        &self,
        handle: &dyn BackendHandle,
        name: &str,
        spec: &mut RoleSpec,
        status: &RoleStatus,
    ) -> Result<Observation> {
        let query = Statement::new(OBSERVE_ROLE).bind(name);
        let Some(row) = scan_optional(handle, ResourceKind::Role, &query).await? else {
            return Ok(Observation::absent());
        };

        let decode = |e| Error::statement(ResourceKind::Role, Operation::Observe, e);
        let observed = RolePrivileges {
            super_user: Some(row.get_bool(0).map_err(decode)?),
            inherit: Some(row.get_bool(1).map_err(decode)?),
            create_db: Some(row.get_bool(2).map_err(decode)?),
            create_role: Some(row.get_bool(3).map_err(decode)?),
            login: Some(row.get_bool(4).map_err(decode)?),
            replication: Some(row.get_bool(5).map_err(decode)?),
            bypass_rls: Some(row.get_bool(6).map_err(decode)?),
        };
        let observed_limit = row.get_i64(7).map_err(decode)?;

        // One-way fill: observed values only land in fields the user left
        // unset.
        let mut late_initialized = false;
        let fill = |field: &mut Option<bool>, observed: Option<bool>, touched: &mut bool| {
            if field.is_none() {
                *field = observed;
                *touched = true;
            }
        };
        fill(
            &mut spec.privileges.super_user,
            observed.super_user,
            &mut late_initialized,
        );
        fill(
            &mut spec.privileges.inherit,
            observed.inherit,
            &mut late_initialized,
        );
        fill(
            &mut spec.privileges.create_db,
            observed.create_db,
            &mut late_initialized,
        );
        fill(
            &mut spec.privileges.create_role,
            observed.create_role,
            &mut late_initialized,
        );
        fill(
            &mut spec.privileges.login,
            observed.login,
            &mut late_initialized,
        );
        fill(
            &mut spec.privileges.replication,
            observed.replication,
            &mut late_initialized,
        );
        fill(
            &mut spec.privileges.bypass_rls,
            observed.bypass_rls,
            &mut late_initialized,
        );
        if spec.connection_limit.is_none() {
            spec.connection_limit = Some(observed_limit);
            late_initialized = true;
        }

        let desired_clauses = privileges_as_clauses(&spec.privileges);
        let observed_clauses = privileges_as_clauses(&observed);
        let changed = changed_clauses(&observed_clauses, &desired_clauses)?;

        let parameters_up_to_date = match &spec.configuration_parameters {
            None => true,
            Some(desired) => same_parameters(
                desired,
                status.configuration_parameters.as_deref().unwrap_or(&[]),
            ),
        };

        // A pending rotation forces not-up-to-date even when everything
        // else matches.
        let rotation_pending = self.resolve(spec).await?.changed;

        let up_to_date = changed.is_empty()
            && spec.connection_limit == Some(observed_limit)
            && parameters_up_to_date
            && !rotation_pending;

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
        spec: &RoleSpec,
        status: &mut RoleStatus,
    ) -> Result<Option<ConnectionDetails>> {
        let resolved = self.resolve(spec).await?;
        let password = if resolved.password.is_empty() {
            generate_password()
        } else {
            resolved.password
        };

        let dialect = handle.dialect();
        let clauses = privileges_as_clauses(&spec.privileges);
        let mut sql = format!(
            "CREATE ROLE {} PASSWORD {}",
            dialect.quote_identifier(name),
            dialect.quote_literal(&password)
        );
        if !clauses.is_empty() {
            sql.push(' ');
            sql.push_str(&clauses.join(" "));
        }
        self.exec(handle, Operation::Create, Statement::new(sql))
            .await?;

        status.privileges_as_clauses = clauses;

        let mut connection = ConnectionDetails::new();
        connection.insert(details::USERNAME.to_string(), name.to_string());
        connection.insert(details::PASSWORD.to_string(), password);
        Ok(Some(connection))
    }

    async fn update(
        &self,
        handle: &dyn BackendHandle,
        name: &str,
        spec: &RoleSpec,
        status: &mut RoleStatus,
    ) -> Result<Option<ConnectionDetails>> {
        let dialect = handle.dialect();
        let quoted = dialect.quote_identifier(name);
        let mut connection = None;

        let resolved = self.resolve(spec).await?;
        if resolved.changed {
            let sql = format!(
                "ALTER ROLE {} PASSWORD {}",
                quoted,
                dialect.quote_literal(&resolved.password)
            );
            self.exec(handle, Operation::Update, Statement::new(sql))
                .await?;

            let mut details_map = ConnectionDetails::new();
            details_map.insert(details::USERNAME.to_string(), name.to_string());
            details_map.insert(details::PASSWORD.to_string(), resolved.password);
            connection = Some(details_map);
        }

        // Only clauses whose position differs from the last-applied
        // snapshot are re-issued.
        let desired_clauses = privileges_as_clauses(&spec.privileges);
        let changed = changed_clauses(&status.privileges_as_clauses, &desired_clauses)?;
        if !changed.is_empty() {
            let sql = format!("ALTER ROLE {} {}", quoted, changed.join(" "));
            self.exec(handle, Operation::Update, Statement::new(sql))
                .await?;
            status.privileges_as_clauses = desired_clauses;
        }

        // Only a limit that differs from the last-applied one is re-issued.
        if let Some(limit) = spec.connection_limit {
            if status.connection_limit != Some(limit) {
                let sql = format!("ALTER ROLE {quoted} CONNECTION LIMIT {limit}");
                self.exec(handle, Operation::Update, Statement::new(sql))
                    .await?;
                status.connection_limit = Some(limit);
            }
        }

        if let Some(parameters) = &spec.configuration_parameters {
            let applied = status.configuration_parameters.as_deref().unwrap_or(&[]);
            if !same_parameters(parameters, applied) {
                // RESET ALL plus per-parameter SET, observed as one atomic
                // step by the next reconcile.
                let mut statements =
                    vec![Statement::new(format!("ALTER ROLE {quoted} RESET ALL"))];
                for parameter in parameters {
                    statements.push(Statement::new(format!(
                        "ALTER ROLE {} SET {} = {}",
                        quoted,
                        dialect.quote_identifier(&parameter.name),
                        dialect.quote_literal(&parameter.value)
                    )));
                }
                handle
                    .exec_tx(&statements)
                    .await
                    .map_err(|e| Error::statement(ResourceKind::Role, Operation::Update, e))?;
                status.configuration_parameters = Some(parameters.clone());
            }
        }

        Ok(connection)
    }

    async fn delete(
        &self,
        handle: &dyn BackendHandle,
        name: &str,
        _spec: &RoleSpec,
    ) -> Result<()> {
        let sql = format!(
            "DROP ROLE IF EXISTS {}",
            handle.dialect().quote_identifier(name)
        );
        self.exec(handle, Operation::Delete, Statement::new(sql))
            .await
    }
}
