//! Per-kind reconcilers for sqlward.
//!
//! Each managed kind implements the [`ManagedKind`] capability trait:
//! observe current attributes, then create, update, or delete through the
//! minimal set of synthesized statements. A [`Reconciler`] wraps one kind
//! and drives the Observe → Diff → Synthesize → Execute pipeline for one
//! object per invocation.
//!
//! Kinds are organized by dialect:
//!
//! - [`postgres`] - `Role`, `Schema`, `Extension`, `DefaultPrivileges`, `Grant`
//! - [`mysql`] - `Database`
//!
//! Statement shapes are compatibility-significant (audit tooling depends on
//! exact clause wording and ordering); synthesis functions are pure and
//! deterministic so they can be asserted byte-for-byte.

pub mod context;
pub mod error;
pub mod kind;
pub mod mysql;
pub mod postgres;
pub mod reconciler;

pub use context::ProviderContext;
pub use error::{Error, Result};
pub use kind::ManagedKind;
pub use reconciler::Reconciler;

// Re-export the vocabulary the host needs alongside the reconcilers.
pub use sqlward_core::{
    details, ConnectionDetails, Observation, Operation, ReconcileOutcome, ResourceKind,
};
