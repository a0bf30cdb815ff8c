//! Backend error types.
//!
//! Absence conditions ("no rows", "referenced catalog does not exist") are
//! modeled explicitly so observers can normalize them to "object absent"
//! instead of treating them as failures.

use thiserror::Error;

/// Error that can occur while talking to a SQL backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Failed to establish a connection or a pool.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The database / catalog a statement referenced does not exist.
    ///
    /// For database-scoped kinds this is an absence signal, not a failure:
    /// a dangling reference to a deleted database must read as "object
    /// absent" so the convergence loop treats it as re-creatable.
    #[error("database does not exist")]
    DatabaseAbsent {
        #[source]
        source: sqlx::Error,
    },

    /// A statement failed to execute.
    #[error("statement failed: {message}")]
    Statement {
        message: String,
        #[source]
        source: sqlx::Error,
    },

    /// A transaction could not be started, committed, or rolled back.
    #[error("transaction failed: {message}")]
    Transaction {
        message: String,
        #[source]
        source: sqlx::Error,
    },

    /// A scanned row could not be decoded into the expected shape.
    #[error("cannot decode column {column}")]
    Decode {
        column: usize,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// The configuration names a dialect this handle does not serve.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl BackendError {
    /// Whether this error signals absence rather than failure.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, BackendError::DatabaseAbsent { .. })
    }

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        BackendError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        BackendError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a decode error without a driver-level source.
    pub fn decode(column: usize) -> Self {
        BackendError::Decode {
            column,
            source: None,
        }
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
