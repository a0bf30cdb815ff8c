//! The managed-kind capability trait.
//!
//! One implementation exists per kind, selected once when the host
//! registers its controllers; nothing re-checks the kind per call.

use async_trait::async_trait;

use sqlward_backend::{BackendHandle, BackendRow, Statement};
use sqlward_core::{ConnectionDetails, Observation, Operation, ResourceKind};

use crate::error::{Error, Result};

/// Observe/create/update/delete capability for one managed kind.
///
/// `observe` may late-initialize unset desired fields from observed state,
/// which is why it takes the spec mutably; it never overwrites a field the
/// user has set. `create` and `update` may record applied state in the
/// status snapshot for later incremental diffs.
#[async_trait]
pub trait ManagedKind: Send + Sync {
    /// Kind-specific desired attributes.
    type Spec: Send + Sync;
    /// Kind-specific applied-state snapshot.
    type Status: Send + Sync;

    /// The kind this reconciler serves.
    fn kind(&self) -> ResourceKind;

    /// Query current attributes and diff them against desired state.
    async fn observe(
        &self,
        handle: &dyn BackendHandle,
        name: &str,
        spec: &mut Self::Spec,
        status: &Self::Status,
    ) -> Result<Observation>;

    /// Bring a non-existent object into existence.
    ///
    /// Returns connection details to publish when the kind produces any
    /// (a created role's password, a created database's name).
    async fn create(
        &self,
        handle: &dyn BackendHandle,
        name: &str,
        spec: &Self::Spec,
        status: &mut Self::Status,
    ) -> Result<Option<ConnectionDetails>>;

    /// Adjust an existing object toward desired state. Never drops and
    /// recreates the object; only ALTER-class statements are issued, except
    /// for grant-like kinds which re-issue their rows idempotently.
    async fn update(
        &self,
        handle: &dyn BackendHandle,
        name: &str,
        spec: &Self::Spec,
        status: &mut Self::Status,
    ) -> Result<Option<ConnectionDetails>>;

    /// Remove the object. Absence (including a missing parent catalog) is
    /// success.
    async fn delete(
        &self,
        handle: &dyn BackendHandle,
        name: &str,
        spec: &Self::Spec,
    ) -> Result<()>;
}

/// Scan at most one row, normalizing absence signals to `None`.
pub(crate) async fn scan_optional(
    handle: &dyn BackendHandle,
    kind: ResourceKind,
    query: &Statement,
) -> Result<Option<BackendRow>> {
    match handle.fetch_optional(query).await {
        Ok(row) => Ok(row),
        Err(e) if e.is_absent() => Ok(None),
        Err(e) => Err(Error::statement(kind, Operation::Observe, e)),
    }
}

/// Scan all rows, normalizing absence signals to an empty set.
pub(crate) async fn scan_all(
    handle: &dyn BackendHandle,
    kind: ResourceKind,
    query: &Statement,
) -> Result<Vec<BackendRow>> {
    match handle.fetch_all(query).await {
        Ok(rows) => Ok(rows),
        Err(e) if e.is_absent() => Ok(Vec::new()),
        Err(e) => Err(Error::statement(kind, Operation::Observe, e)),
    }
}
