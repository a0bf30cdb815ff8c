//! Database reconciler.
//!
//! Character set and collation late-initialize from the live database on
//! first observe, so an empty spec converges to whatever the server picked
//! as defaults rather than fighting it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use sqlward_backend::{BackendHandle, Dialect, Statement};
use sqlward_core::{details, ConnectionDetails, Observation, Operation, ResourceKind};

use crate::error::{Error, Result};
use crate::kind::{scan_optional, ManagedKind};

const OBSERVE_DATABASE: &str = "SELECT DEFAULT_CHARACTER_SET_NAME, DEFAULT_COLLATION_NAME \
     FROM INFORMATION_SCHEMA.SCHEMATA WHERE SCHEMA_NAME = ?";

/// Desired database properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Default character set. Late-initialized from the server when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_set: Option<String>,

    /// Default collation. Late-initialized from the server when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
}

fn validate(spec: &DatabaseSpec) -> Result<()> {
    // Charset and collation names go into statements unquoted; they are
    // always plain lowercase identifiers (utf8mb4, utf8mb4_unicode_ci).
    for value in [&spec.character_set, &spec.collation].into_iter().flatten() {
        if value.is_empty()
            || !value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::invalid_spec(format!(
                "'{value}' is not a valid character set or collation name"
            )));
        }
    }
    Ok(())
}

fn clauses(spec: &DatabaseSpec) -> String {
    let mut sql = String::new();
    // Fixed clause order, charset before collation.
    if let Some(charset) = &spec.character_set {
        sql.push_str(&format!(" CHARACTER SET {charset}"));
    }
    if let Some(collation) = &spec.collation {
        sql.push_str(&format!(" COLLATE {collation}"));
    }
    sql
}

/// `CREATE DATABASE` statement for the desired properties.
pub fn create_statement(dialect: Dialect, name: &str, spec: &DatabaseSpec) -> Result<Statement> {
    validate(spec)?;
    Ok(Statement::new(format!(
        "CREATE DATABASE {}{}",
        dialect.quote_identifier(name),
        clauses(spec)
    )))
}

/// `ALTER DATABASE` statement converging the live properties.
pub fn update_statement(dialect: Dialect, name: &str, spec: &DatabaseSpec) -> Result<Statement> {
    validate(spec)?;
    Ok(Statement::new(format!(
        "ALTER DATABASE {}{}",
        dialect.quote_identifier(name),
        clauses(spec)
    )))
}

pub fn delete_statement(dialect: Dialect, name: &str) -> Statement {
    Statement::new(format!(
        "DROP DATABASE IF EXISTS {}",
        dialect.quote_identifier(name)
    ))
}

/// Database reconciler for MySQL backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct Database;

impl Database {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ManagedKind for Database {
    type Spec = DatabaseSpec;
    type Status = ();

    fn kind(&self) -> ResourceKind {
        ResourceKind::Database
    }

    async fn observe(
        &self,
        handle: &dyn BackendHandle,
        name: &str,
        spec: &mut DatabaseSpec,
        _status: &(),
    ) -> Result<Observation> {
        let query = Statement::new(OBSERVE_DATABASE).bind(name);
        let row = match scan_optional(handle, ResourceKind::Database, &query).await? {
            Some(row) => row,
            None => return Ok(Observation::absent()),
        };

        let charset = row
            .get_string(0)
            .map_err(|e| Error::statement(ResourceKind::Database, Operation::Observe, e))?;
        let collation = row
            .get_string(1)
            .map_err(|e| Error::statement(ResourceKind::Database, Operation::Observe, e))?;

        let mut late_initialized = false;
        if spec.character_set.is_none() {
            debug!(database = name, %charset, "late-initializing character set");
            spec.character_set = Some(charset.clone());
            late_initialized = true;
        }
        if spec.collation.is_none() {
            debug!(database = name, %collation, "late-initializing collation");
            spec.collation = Some(collation.clone());
            late_initialized = true;
        }

        let up_to_date = spec.character_set.as_deref() == Some(charset.as_str())
            && spec.collation.as_deref() == Some(collation.as_str());

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
        spec: &DatabaseSpec,
        _status: &mut (),
    ) -> Result<Option<ConnectionDetails>> {
        let statement = create_statement(handle.dialect(), name, spec)?;
        handle
            .exec(&statement)
            .await
            .map_err(|e| Error::statement(ResourceKind::Database, Operation::Create, e))?;

        let mut connection = ConnectionDetails::new();
        connection.insert(details::DATABASE.to_string(), name.to_string());
        Ok(Some(connection))
    }

    async fn update(
        &self,
        handle: &dyn BackendHandle,
        name: &str,
        spec: &DatabaseSpec,
        _status: &mut (),
    ) -> Result<Option<ConnectionDetails>> {
        let statement = update_statement(handle.dialect(), name, spec)?;
        handle
            .exec(&statement)
            .await
            .map_err(|e| Error::statement(ResourceKind::Database, Operation::Update, e))?;
        Ok(None)
    }

    async fn delete(
        &self,
        handle: &dyn BackendHandle,
        name: &str,
        _spec: &DatabaseSpec,
    ) -> Result<()> {
        let statement = delete_statement(handle.dialect(), name);
        handle
            .exec(&statement)
            .await
            .map_err(|e| Error::statement(ResourceKind::Database, Operation::Delete, e))
    }
}
