//! `MySQL` backend handle.
//!
//! `ER_BAD_DB_ERROR` (1049, unknown database) is surfaced as
//! [`BackendError::DatabaseAbsent`], mirroring the postgres handle's
//! treatment of `invalid_catalog_name`.

use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlDatabaseError, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;
use tracing::{debug, instrument};

use crate::config::{ConnectionConfig, Dialect};
use crate::error::{BackendError, BackendResult};
use crate::handle::{BackendHandle, BackendRow, ScanValue, Statement};

/// `MySQL` error number for a statement referencing an unknown database.
const ER_BAD_DB_ERROR: u16 = 1049;

/// Backend handle over a `MySQL` connection pool.
pub struct MySqlHandle {
    pool: MySqlPool,
}

impl std::fmt::Debug for MySqlHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlHandle").finish()
    }
}

impl MySqlHandle {
    /// Connect a pool for the `MySQL` dialect.
    #[instrument(skip(config), fields(host = %config.host))]
    pub async fn connect(config: &ConnectionConfig) -> BackendResult<Self> {
        if config.dialect != Dialect::MySql {
            return Err(BackendError::InvalidConfiguration {
                message: format!(
                    "dialect {} is not served by the mysql handle",
                    config.dialect.as_str()
                ),
            });
        }
        config.validate()?;

        let pool = MySqlPoolOptions::new()
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

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn query<'a>(statement: &'a Statement) -> sqlx::query::Query<'a, sqlx::MySql, MySqlArguments> {
        let mut query = sqlx::query(&statement.sql);
        for bind in &statement.binds {
            query = query.bind(bind.as_str());
        }
        query
    }

    fn classify(error: sqlx::Error, message: &str) -> BackendError {
        let number = match &error {
            sqlx::Error::Database(db) => db
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(MySqlDatabaseError::number),
            _ => None,
        };
        if number == Some(ER_BAD_DB_ERROR) {
            return BackendError::DatabaseAbsent { source: error };
        }
        BackendError::Statement {
            message: message.to_string(),
            source: error,
        }
    }

    fn decode_row(row: &MySqlRow) -> BackendResult<BackendRow> {
        let mut values = Vec::with_capacity(row.len());
        for column in 0..row.len() {
            let value = if let Ok(v) = row.try_get::<Option<bool>, _>(column) {
                v.map_or(ScanValue::Null, ScanValue::Bool)
            } else if let Ok(v) = row.try_get::<Option<i64>, _>(column) {
                v.map_or(ScanValue::Null, ScanValue::Int)
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
impl BackendHandle for MySqlHandle {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
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
