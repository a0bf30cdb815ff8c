//! Operation and resource-kind vocabulary.
//!
//! Every error surfaced to the host is tagged with the operation it occurred
//! in and the kind it was operating on, so the taxonomy lives here rather
//! than as ambient string constants.

use serde::{Deserialize, Serialize};

/// The phase of the reconcile pipeline an action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Reading current attributes from the backend.
    Observe,
    /// Issuing create statements.
    Create,
    /// Issuing update statements.
    Update,
    /// Issuing delete statements.
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Observe => write!(f, "observe"),
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// The kinds of SQL objects sqlward manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A database / catalog.
    Database,
    /// A role (user) with privilege flags and an optional managed password.
    Role,
    /// A schema inside a database.
    Schema,
    /// A database extension.
    Extension,
    /// A default-privilege rule applied to future objects in a schema.
    DefaultPrivileges,
    /// A privilege or membership grant.
    Grant,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Database => write!(f, "database"),
            ResourceKind::Role => write!(f, "role"),
            ResourceKind::Schema => write!(f, "schema"),
            ResourceKind::Extension => write!(f, "extension"),
            ResourceKind::DefaultPrivileges => write!(f, "default privileges"),
            ResourceKind::Grant => write!(f, "grant"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::Observe.to_string(), "observe");
        assert_eq!(Operation::Create.to_string(), "create");
        assert_eq!(Operation::Update.to_string(), "update");
        assert_eq!(Operation::Delete.to_string(), "delete");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ResourceKind::Role.to_string(), "role");
        assert_eq!(
            ResourceKind::DefaultPrivileges.to_string(),
            "default privileges"
        );
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&ResourceKind::DefaultPrivileges).unwrap();
        assert_eq!(json, "\"default_privileges\"");
    }
}
