//! Default-privileges reconciler.
//!
//! Default-privilege rows are idempotent to re-issue, so update synthesizes
//! the full GRANT again on every non-up-to-date cycle; the only diff needed
//! is membership comparison of the privilege list.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sqlward_backend::{BackendHandle, Dialect, Statement};
use sqlward_core::{ConnectionDetails, Observation, Operation, ResourceKind};

use crate::error::{Error, Result};
use crate::kind::{scan_all, ManagedKind};

const OBSERVE_FOR_TARGET: &str = "SELECT a.privilege_type \
     FROM pg_default_acl d \
     JOIN pg_roles owner ON d.defaclrole = owner.oid \
     JOIN pg_namespace n ON d.defaclnamespace = n.oid \
     CROSS JOIN LATERAL aclexplode(d.defaclacl) a \
     JOIN pg_roles grantee ON a.grantee = grantee.oid \
     WHERE owner.rolname = $1 AND n.nspname = $2 \
       AND d.defaclobjtype = $3 AND grantee.rolname = $4";

const OBSERVE_FOR_CURRENT: &str = "SELECT a.privilege_type \
     FROM pg_default_acl d \
     JOIN pg_roles owner ON d.defaclrole = owner.oid \
     JOIN pg_namespace n ON d.defaclnamespace = n.oid \
     CROSS JOIN LATERAL aclexplode(d.defaclacl) a \
     JOIN pg_roles grantee ON a.grantee = grantee.oid \
     WHERE owner.rolname = current_user AND n.nspname = $1 \
       AND d.defaclobjtype = $2 AND grantee.rolname = $3";

/// Object class a default-privilege rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultObjectType {
    Table,
    Sequence,
    Function,
    Type,
}

impl DefaultObjectType {
    /// Pluralized clause form used in statements.
    #[must_use]
    pub fn clause(&self) -> &'static str {
        match self {
            DefaultObjectType::Table => "TABLES",
            DefaultObjectType::Sequence => "SEQUENCES",
            DefaultObjectType::Function => "FUNCTIONS",
            DefaultObjectType::Type => "TYPES",
        }
    }

    /// Single-character code used by `pg_default_acl.defaclobjtype`.
    #[must_use]
    pub fn acl_code(&self) -> &'static str {
        match self {
            DefaultObjectType::Table => "r",
            DefaultObjectType::Sequence => "S",
            DefaultObjectType::Function => "f",
            DefaultObjectType::Type => "T",
        }
    }
}

/// Desired default-privilege rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultPrivilegesSpec {
    /// Role whose future objects the rule applies to. When unset, the rule
    /// applies to objects created by the connected provider role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_role: Option<String>,

    /// Schema the rule is scoped to.
    pub schema: String,

    /// Object class.
    pub object_type: DefaultObjectType,

    /// Privileges to grant, from the kind's schema enumeration.
    pub privileges: Vec<String>,

    /// Grantee role.
    pub role: String,

    /// Whether the grantee may grant onward.
    #[serde(default)]
    pub with_grant_option: bool,
}

fn validate(spec: &DefaultPrivilegesSpec) -> Result<()> {
    if spec.privileges.is_empty() {
        return Err(Error::invalid_spec("default privileges require at least one privilege"));
    }
    // Privilege words come from a schema enumeration and are concatenated
    // into statements; reject anything outside that shape.
    for privilege in &spec.privileges {
        if privilege.is_empty()
            || !privilege.chars().all(|c| c.is_ascii_uppercase() || c == ' ')
        {
            return Err(Error::invalid_spec(format!(
                "'{privilege}' is not a recognized privilege"
            )));
        }
    }
    Ok(())
}

/// Statement (re-)issuing the rule. Identical for create and update.
pub fn apply_statement(
    dialect: Dialect,
    spec: &DefaultPrivilegesSpec,
) -> Result<Statement> {
    validate(spec)?;
    let mut sql = String::from("ALTER DEFAULT PRIVILEGES");
    if let Some(target) = &spec.target_role {
        sql.push_str(&format!(" FOR ROLE {}", dialect.quote_identifier(target)));
    }
    sql.push_str(&format!(
        " IN SCHEMA {} GRANT {} ON {} TO {}",
        dialect.quote_identifier(&spec.schema),
        spec.privileges.join(", "),
        spec.object_type.clause(),
        dialect.quote_identifier(&spec.role)
    ));
    if spec.with_grant_option {
        sql.push_str(" WITH GRANT OPTION");
    }
    Ok(Statement::new(sql))
}

/// Statement revoking the rule.
pub fn revoke_statement(
    dialect: Dialect,
    spec: &DefaultPrivilegesSpec,
) -> Result<Statement> {
    validate(spec)?;
    let mut sql = String::from("ALTER DEFAULT PRIVILEGES");
    if let Some(target) = &spec.target_role {
        sql.push_str(&format!(" FOR ROLE {}", dialect.quote_identifier(target)));
    }
    sql.push_str(&format!(
        " IN SCHEMA {} REVOKE {} ON {} FROM {}",
        dialect.quote_identifier(&spec.schema),
        spec.privileges.join(", "),
        spec.object_type.clause(),
        dialect.quote_identifier(&spec.role)
    ));
    Ok(Statement::new(sql))
}

/// Default-privileges reconciler for postgres-wire backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPrivileges;

impl DefaultPrivileges {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn apply(
        &self,
        handle: &dyn BackendHandle,
        operation: Operation,
        spec: &DefaultPrivilegesSpec,
    ) -> Result<()> {
        let statement = apply_statement(handle.dialect(), spec)?;
        handle
            .exec(&statement)
            .await
            .map_err(|e| Error::statement(ResourceKind::DefaultPrivileges, operation, e))
    }
}

#[async_trait]
impl ManagedKind for DefaultPrivileges {
    type Spec = DefaultPrivilegesSpec;
    type Status = ();

    fn kind(&self) -> ResourceKind {
        ResourceKind::DefaultPrivileges
    }

    async fn observe(
        &self,
        handle: &dyn BackendHandle,
        _name: &str,
        spec: &mut DefaultPrivilegesSpec,
        _status: &(),
    ) -> Result<Observation> {
        let query = match &spec.target_role {
            Some(target) => Statement::new(OBSERVE_FOR_TARGET)
                .bind(target)
                .bind(&spec.schema)
                .bind(spec.object_type.acl_code())
                .bind(&spec.role),
            None => Statement::new(OBSERVE_FOR_CURRENT)
                .bind(&spec.schema)
                .bind(spec.object_type.acl_code())
                .bind(&spec.role),
        };

        let rows = scan_all(handle, ResourceKind::DefaultPrivileges, &query).await?;
        if rows.is_empty() {
            return Ok(Observation::absent());
        }

        let mut observed = BTreeSet::new();
        for row in &rows {
            observed.insert(row.get_string(0).map_err(|e| {
                Error::statement(ResourceKind::DefaultPrivileges, Operation::Observe, e)
            })?);
        }
        let up_to_date = spec
            .privileges
            .iter()
            .all(|privilege| observed.contains(privilege));

        Ok(Observation {
            exists: true,
            late_initialized: false,
            up_to_date,
        })
    }

    async fn create(
        &self,
        handle: &dyn BackendHandle,
        _name: &str,
        spec: &DefaultPrivilegesSpec,
        _status: &mut (),
    ) -> Result<Option<ConnectionDetails>> {
        self.apply(handle, Operation::Create, spec).await?;
        Ok(None)
    }

    async fn update(
        &self,
        handle: &dyn BackendHandle,
        _name: &str,
        spec: &DefaultPrivilegesSpec,
        _status: &mut (),
    ) -> Result<Option<ConnectionDetails>> {
        // Full re-issue; the row is idempotent.
        self.apply(handle, Operation::Update, spec).await?;
        Ok(None)
    }

    async fn delete(
        &self,
        handle: &dyn BackendHandle,
        _name: &str,
        spec: &DefaultPrivilegesSpec,
    ) -> Result<()> {
        let statement = revoke_statement(handle.dialect(), spec)?;
        handle
            .exec(&statement)
            .await
            .map_err(|e| Error::statement(ResourceKind::DefaultPrivileges, Operation::Delete, e))
    }
}
