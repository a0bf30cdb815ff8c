//! The per-object reconcile pipeline.
//!
//! Strictly sequential: Observe → Diff (inside observe) → Synthesize →
//! Execute. The host invokes one reconcile at a time per object; reconciles
//! of different objects share no mutable state.

use tracing::{debug, instrument};

use sqlward_backend::BackendHandle;
use sqlward_core::{ConnectionDetails, ReconcileOutcome};

use crate::error::Result;
use crate::kind::ManagedKind;

/// Drives the pipeline for one managed kind.
///
/// Constructed once at controller registration; `reconcile` is then called
/// per object per cycle. Seed details (host, port, database) from the
/// provider context are merged into any details a kind returns, so the host
/// receives a complete connection secret.
pub struct Reconciler<K: ManagedKind> {
    kind: K,
    seed_details: ConnectionDetails,
}

impl<K: ManagedKind> Reconciler<K> {
    /// Create a reconciler for one kind.
    pub fn new(kind: K) -> Self {
        Self {
            kind,
            seed_details: ConnectionDetails::new(),
        }
    }

    /// Merge these details into everything the kind returns.
    #[must_use]
    pub fn with_seed_details(mut self, details: ConnectionDetails) -> Self {
        self.seed_details = details;
        self
    }

    /// Run one reconcile invocation for one object.
    ///
    /// With `deleting` set, issues the kind's drop statements; an object
    /// whose parent catalog is already gone deletes successfully.
    #[instrument(skip_all, fields(kind = %self.kind.kind(), name))]
    pub async fn reconcile(
        &self,
        handle: &dyn BackendHandle,
        name: &str,
        spec: &mut K::Spec,
        status: &mut K::Status,
        deleting: bool,
    ) -> Result<ReconcileOutcome> {
        if deleting {
            match self.kind.delete(handle, name, spec).await {
                Ok(()) => {}
                Err(e) if e.is_absent() => {
                    debug!("parent catalog already absent, delete is a no-op");
                }
                Err(e) => return Err(e),
            }
            return Ok(ReconcileOutcome::absent());
        }

        let observation = self.kind.observe(handle, name, spec, status).await?;
        debug!(
            exists = observation.exists,
            up_to_date = observation.up_to_date,
            late_initialized = observation.late_initialized,
            "observed"
        );

        if !observation.exists {
            let details = self.kind.create(handle, name, spec, status).await?;
            let mut outcome = ReconcileOutcome {
                exists: true,
                late_initialized: observation.late_initialized,
                up_to_date: true,
                connection_details: None,
            };
            if let Some(details) = details {
                outcome = outcome.with_connection_details(self.merge(details));
            }
            return Ok(outcome);
        }

        if !observation.up_to_date {
            let details = self.kind.update(handle, name, spec, status).await?;
            let mut outcome = ReconcileOutcome {
                exists: true,
                late_initialized: observation.late_initialized,
                up_to_date: true,
                connection_details: None,
            };
            if let Some(details) = details {
                outcome = outcome.with_connection_details(self.merge(details));
            }
            return Ok(outcome);
        }

        Ok(ReconcileOutcome::observed(observation))
    }

    fn merge(&self, details: ConnectionDetails) -> ConnectionDetails {
        let mut merged = self.seed_details.clone();
        merged.extend(details);
        merged
    }
}
