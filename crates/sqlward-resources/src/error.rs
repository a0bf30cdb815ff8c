//! Host-facing error taxonomy.
//!
//! A closed enumeration with structured fields (operation, kind, cause)
//! instead of ambient message constants. Absence is never an error here:
//! observers normalize "no rows" and "referenced catalog missing" to
//! `exists = false` before anything reaches this type.

use thiserror::Error;

use sqlward_backend::BackendError;
use sqlward_core::{Operation, ResourceKind};
use sqlward_secrets::SecretError;

/// Error surfaced to the host from a reconcile invocation.
#[derive(Debug, Error)]
pub enum Error {
    /// A statement failed during the tagged operation.
    ///
    /// Transactional batches leave no partial state; a failed
    /// single-statement operation may leave the object partially modified,
    /// an accepted limitation of non-transactional statements.
    #[error("cannot {operation} {kind}")]
    Statement {
        kind: ResourceKind,
        operation: Operation,
        #[source]
        source: BackendError,
    },

    /// The backend could not be reached or the connection context could not
    /// be built. Fatal for this cycle; the host retries on its own schedule.
    #[error("cannot connect to backend")]
    Connection {
        #[source]
        source: BackendError,
    },

    /// The observed privilege-clause list is shorter than the desired one,
    /// so a positional comparison would be guessing. Never decided
    /// automatically: a shorter list means the backend surface does not yet
    /// expose every recognized clause.
    #[error("cannot compare privileges: {observed} observed clauses, {desired} desired")]
    Comparison { observed: usize, desired: usize },

    /// Credential resolution failed.
    #[error("cannot resolve credentials")]
    Secret {
        #[source]
        source: SecretError,
    },

    /// The desired state is internally inconsistent.
    #[error("invalid desired state: {message}")]
    InvalidSpec { message: String },
}

impl Error {
    /// Create a statement error tagged with its operation.
    pub fn statement(kind: ResourceKind, operation: Operation, source: BackendError) -> Self {
        Error::Statement {
            kind,
            operation,
            source,
        }
    }

    /// Create a connection error.
    pub fn connection(source: BackendError) -> Self {
        Error::Connection { source }
    }

    /// Create a credential error.
    pub fn secret(source: SecretError) -> Self {
        Error::Secret { source }
    }

    /// Create an invalid-spec error.
    pub fn invalid_spec(message: impl Into<String>) -> Self {
        Error::InvalidSpec {
            message: message.into(),
        }
    }

    /// Whether the underlying cause is an absence signal (referenced
    /// catalog gone). Deletes treat this as success.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            Error::Statement { source, .. } | Error::Connection { source } if source.is_absent()
        )
    }
}

/// Result type for reconcile operations.
pub type Result<T> = std::result::Result<T, Error>;
