//! Reconcile outcome types.
//!
//! The host consumes these to drive its requeue/backoff decisions and to
//! persist connection details as a secret after a create or a password
//! rotation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Connection-detail map returned to the host.
///
/// Keys are the constants in [`details`]. Values are plaintext; the host is
/// responsible for storing them as a secret.
pub type ConnectionDetails = BTreeMap<String, String>;

/// Well-known keys for [`ConnectionDetails`].
pub mod details {
    /// Backend host name.
    pub const HOST: &str = "host";
    /// Backend port.
    pub const PORT: &str = "port";
    /// Role / user name.
    pub const USERNAME: &str = "username";
    /// Role password (newly created or rotated).
    pub const PASSWORD: &str = "password";
    /// Database name.
    pub const DATABASE: &str = "database";
}

/// What an observer learned about one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Whether the object exists in the backend. A missing parent catalog
    /// reads as `false`, never as an error.
    pub exists: bool,
    /// Whether unset desired fields were back-filled from observed state.
    /// When true the host must persist the updated desired record.
    pub late_initialized: bool,
    /// Whether observed state already satisfies desired state. Never true
    /// while a credential rotation is pending.
    pub up_to_date: bool,
}

impl Observation {
    /// Observation of an object that does not exist.
    #[must_use]
    pub fn absent() -> Self {
        Self {
            exists: false,
            late_initialized: false,
            up_to_date: false,
        }
    }
}

/// Result of one reconcile invocation, returned to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    /// Whether the object exists after this invocation.
    pub exists: bool,
    /// Whether desired state was late-initialized during observation.
    pub late_initialized: bool,
    /// Whether the object is in compliance after this invocation.
    pub up_to_date: bool,
    /// Connection details to publish, present after a create or a
    /// password rotation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_details: Option<ConnectionDetails>,
}

impl ReconcileOutcome {
    /// Outcome for an object that does not exist (post-delete, or a delete
    /// of an already-absent object).
    #[must_use]
    pub fn absent() -> Self {
        Self {
            exists: false,
            late_initialized: false,
            up_to_date: false,
            connection_details: None,
        }
    }

    /// Outcome derived from an observation, with no statements executed.
    #[must_use]
    pub fn observed(observation: Observation) -> Self {
        Self {
            exists: observation.exists,
            late_initialized: observation.late_initialized,
            up_to_date: observation.up_to_date,
            connection_details: None,
        }
    }

    /// Attach connection details.
    #[must_use]
    pub fn with_connection_details(mut self, details: ConnectionDetails) -> Self {
        self.connection_details = Some(details);
        self
    }
}
