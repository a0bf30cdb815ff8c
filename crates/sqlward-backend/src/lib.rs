//! Backend handle abstraction for sqlward.
//!
//! Everything above this crate talks to a SQL engine through the
//! [`BackendHandle`] trait: optional-row scan, multi-row scan, single
//! statement execution, and atomic multi-statement execution. One handle
//! implementation exists per target dialect:
//!
//! - [`PostgresHandle`] - `PostgreSQL`, and `CockroachDB` over the postgres
//!   wire protocol
//! - [`MySqlHandle`] - `MySQL` / `MariaDB`
//!
//! The [`Dialect`] carries the identifier- and literal-quoting rules used by
//! statement synthesis. Identifiers are never interpolated into statements
//! without passing through [`Dialect::quote_identifier`], and values never
//! without [`Dialect::quote_literal`] or a bind parameter.

pub mod config;
pub mod error;
pub mod handle;
pub mod mysql;
pub mod postgres;
pub mod quoting;

pub use config::{ConnectionConfig, ConnectionSettings, Dialect, SslMode};
pub use error::{BackendError, BackendResult};
pub use handle::{connect, BackendHandle, BackendRow, ScanValue, Statement};
pub use mysql::MySqlHandle;
pub use postgres::PostgresHandle;

// Re-export the driver so dependents can match on driver-level errors
// without pinning their own sqlx version.
pub use sqlx;
