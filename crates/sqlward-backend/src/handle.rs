//! The uniform backend operation surface.
//!
//! Higher components depend only on [`BackendHandle`]: optional-row scan,
//! multi-row scan, single statement execution, and atomic multi-statement
//! execution. Handles are scoped to one reconcile invocation and discarded
//! on completion.

use async_trait::async_trait;

use crate::config::{ConnectionConfig, Dialect};
use crate::error::{BackendError, BackendResult};
use crate::mysql::MySqlHandle;
use crate::postgres::PostgresHandle;

/// One SQL statement with positional bind parameters.
///
/// Binds carry untrusted values into catalog queries; DDL text never takes
/// binds and instead quotes identifiers and literals during synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Statement text, with dialect-native placeholders where bound.
    pub sql: String,
    /// Positional bind values.
    pub binds: Vec<String>,
}

impl Statement {
    /// Create a statement with no binds.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }

    /// Append a bind value.
    #[must_use]
    pub fn bind(mut self, value: impl Into<String>) -> Self {
        self.binds.push(value.into());
        self
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.sql)
    }
}

/// A single scanned value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

/// One row scanned from the backend.
///
/// Real handles decode driver rows into [`ScanValue`]s eagerly; in-memory
/// handles used in tests construct rows directly from values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRow {
    values: Vec<ScanValue>,
}

impl BackendRow {
    /// Build a row from already-decoded values.
    #[must_use]
    pub fn from_values(values: Vec<ScanValue>) -> Self {
        Self { values }
    }

    fn value(&self, column: usize) -> BackendResult<&ScanValue> {
        self.values
            .get(column)
            .ok_or(BackendError::decode(column))
    }

    /// Read a non-null boolean column.
    pub fn get_bool(&self, column: usize) -> BackendResult<bool> {
        match self.value(column)? {
            ScanValue::Bool(b) => Ok(*b),
            ScanValue::Int(i) => Ok(*i != 0),
            _ => Err(BackendError::decode(column)),
        }
    }

    /// Read a non-null integer column.
    pub fn get_i64(&self, column: usize) -> BackendResult<i64> {
        match self.value(column)? {
            ScanValue::Int(i) => Ok(*i),
            _ => Err(BackendError::decode(column)),
        }
    }

    /// Read a non-null text column.
    pub fn get_string(&self, column: usize) -> BackendResult<String> {
        match self.value(column)? {
            ScanValue::Text(s) => Ok(s.clone()),
            _ => Err(BackendError::decode(column)),
        }
    }

    /// Read a nullable text column.
    pub fn get_opt_string(&self, column: usize) -> BackendResult<Option<String>> {
        match self.value(column)? {
            ScanValue::Null => Ok(None),
            ScanValue::Text(s) => Ok(Some(s.clone())),
            _ => Err(BackendError::decode(column)),
        }
    }
}

/// Uniform operation surface over a SQL engine.
///
/// All operations are synchronous from the caller's point of view; the host
/// propagates timeouts and cancellation through the task context. A
/// cancelled [`exec_tx`](BackendHandle::exec_tx) never commits a partial
/// batch: the transaction rolls back when the connection is dropped.
#[async_trait]
pub trait BackendHandle: Send + Sync {
    /// The dialect this handle speaks.
    fn dialect(&self) -> Dialect;

    /// Scan at most one row. `Ok(None)` means no rows matched.
    async fn fetch_optional(&self, query: &Statement) -> BackendResult<Option<BackendRow>>;

    /// Scan all matching rows.
    async fn fetch_all(&self, query: &Statement) -> BackendResult<Vec<BackendRow>>;

    /// Execute one statement.
    async fn exec(&self, statement: &Statement) -> BackendResult<()>;

    /// Execute an ordered statement list inside one transaction.
    ///
    /// All-or-nothing: any failure aborts the remaining statements and rolls
    /// back the whole batch.
    async fn exec_tx(&self, statements: &[Statement]) -> BackendResult<()>;
}

/// Connect the dialect-appropriate handle for a configuration.
///
/// This is the single registration-time dispatch point; everything after it
/// goes through the [`BackendHandle`] trait.
pub async fn connect(config: &ConnectionConfig) -> BackendResult<Box<dyn BackendHandle>> {
    config.validate()?;
    match config.dialect {
        Dialect::Postgres | Dialect::Cockroach => {
            Ok(Box::new(PostgresHandle::connect(config).await?))
        }
        Dialect::MySql => Ok(Box::new(MySqlHandle::connect(config).await?)),
    }
}
