//! Postgres-wire backend handle.
//!
//! Serves both `PostgreSQL` and `CockroachDB`. An `invalid_catalog_name`
//! error (SQLSTATE 3D000) from either engine is surfaced as
//! [`BackendError::DatabaseAbsent`] so database-scoped observers can
//! normalize it to "object absent".

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use crate::config::{ConnectionConfig, Dialect};
use crate::error::{BackendError, BackendResult};
use crate::handle::{BackendHandle, BackendRow, ScanValue, Statement};

/// SQLSTATE for a statement referencing a database that does not exist.
const INVALID_CATALOG_NAME: &str = "3D000";

/// Backend handle over a postgres wire connection pool.
pub struct PostgresHandle {
    pool: PgPool,
    dialect: Dialect,
}

impl std::fmt::Debug for PostgresHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresHandle")
            .field("dialect", &self.dialect)
            .finish()
    }
}

impl PostgresHandle {
    /// Connect a pool for a postgres-wire dialect.
    #[instrument(skip(config), fields(host = %config.host, dialect = %config.dialect.as_str()))]
    pub async fn connect(config: &ConnectionConfig) -> BackendResult<Self> {
        if !config.dialect.is_postgres_wire() {
            return Err(BackendError::InvalidConfiguration {
                message: format!(
                    "dialect {} is not served by the postgres handle",
                    config.dialect.as_str()
                ),
            });
        }
        config.validate()?;

        let pool = PgPoolOptions::new()
            .max_connections(config.connection.pool_size)
            .acquire_timeout(config.connection.connection_timeout())
            .connect(&config.url())
            .await
            .map_err(|e| {
                BackendError::connection_failed_with_source(
                    format!(
                        "cannot connect to {}:{}",
                        config.host,
                        config.effective_port()
                    ),
                    e,
                )
            })?;

        debug!("backend connection pool established");

        Ok(Self {
            pool,
            dialect: config.dialect,
        })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool, dialect: Dialect) -> Self {
        Self { pool, dialect }
    }

    fn query<'a>(statement: &'a Statement) -> sqlx::query::Query<'a, sqlx::Postgres, PgArguments> {
        let mut query = sqlx::query(&statement.sql);
        for bind in &statement.binds {
            query = query.bind(bind.as_str());
        }
        query
    }

    fn classify(error: sqlx::Error, message: &str) -> BackendError {
        let code = match &error {
            sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
            _ => None,
        };
        if code.as_deref() == Some(INVALID_CATALOG_NAME) {
            return BackendError::DatabaseAbsent { source: error };
        }
        BackendError::Statement {
            message: message.to_string(),
            source: error,
        }
    }

    fn decode_row(row: &PgRow) -> BackendResult<BackendRow> {
        let mut values = Vec::with_capacity(row.len());
        for column in 0..row.len() {
            let value = if let Ok(v) = row.try_get::<Option<bool>, _>(column) {
                v.map_or(ScanValue::Null, ScanValue::Bool)
            } else if let Ok(v) = row.try_get::<Option<i64>, _>(column) {
                v.map_or(ScanValue::Null, ScanValue::Int)
            } else if let Ok(v) = row.try_get::<Option<i32>, _>(column) {
                v.map_or(ScanValue::Null, |i| ScanValue::Int(i64::from(i)))
            } else if let Ok(v) = row.try_get::<Option<String>, _>(column) {
                v.map_or(ScanValue::Null, ScanValue::Text)
            } else {
                return Err(BackendError::decode(column));
            };
            values.push(value);
        }
        Ok(BackendRow::from_values(values))
    }
}

#[async_trait]
impl BackendHandle for PostgresHandle {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn fetch_optional(&self, query: &Statement) -> BackendResult<Option<BackendRow>> {
        let row = Self::query(query)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::classify(e, "scan failed"))?;
        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn fetch_all(&self, query: &Statement) -> BackendResult<Vec<BackendRow>> {
        let rows = Self::query(query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::classify(e, "scan failed"))?;
        rows.iter().map(Self::decode_row).collect()
    }

    async fn exec(&self, statement: &Statement) -> BackendResult<()> {
        // Statement text can carry quoted credentials; log shape only.
        debug!(binds = statement.binds.len(), "executing statement");
        Self::query(statement)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::classify(e, "statement failed"))?;
        Ok(())
    }

    async fn exec_tx(&self, statements: &[Statement]) -> BackendResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| BackendError::Transaction {
            message: "cannot begin transaction".to_string(),
            source: e,
        })?;

        for (index, statement) in statements.iter().enumerate() {
            if let Err(e) = Self::query(statement).execute(&mut *tx).await {
                // Roll back eagerly; dropping the transaction would too, but
                // an explicit rollback surfaces rollback failures.
                let _ = tx.rollback().await;
                return Err(Self::classify(
                    e,
                    &format!("statement {} of {} failed", index + 1, statements.len()),
                ));
            }
        }

        tx.commit().await.map_err(|e| BackendError::Transaction {
            message: "cannot commit transaction".to_string(),
            source: e,
        })?;

        debug!(statements = statements.len(), "transaction committed");
        Ok(())
    }
}
