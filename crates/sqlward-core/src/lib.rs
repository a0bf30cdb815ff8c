//! sqlward Core Library
//!
//! Shared vocabulary types for sqlward.
//!
//! # Modules
//!
//! - [`operation`] - Operation and resource-kind vocabulary
//! - [`outcome`] - Reconcile outcome types and connection-detail keys
//!
//! # Example
//!
//! ```
//! use sqlward_core::{Operation, ReconcileOutcome};
//!
//! let op = Operation::Create;
//! assert_eq!(op.to_string(), "create");
//!
//! let outcome = ReconcileOutcome::absent();
//! assert!(!outcome.exists);
//! ```

pub mod operation;
pub mod outcome;

// Re-export main types for convenient access
pub use operation::{Operation, ResourceKind};
pub use outcome::{details, ConnectionDetails, Observation, ReconcileOutcome};
