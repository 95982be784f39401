//! Per-kind reconcile entry point.
//!
//! The event loop calls [`Dispatcher::reconcile`] with an object identity.
//! The dispatcher fetches the declared object and branches:
//!
//! - absent: run the kind's cleanup, log failures, report success
//! - present: run the kind's converge routine, surface any failure for retry
//!
//! There is no terminal state; the same identity is reconciled again on every
//! change notification or resync.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::client::DynClusterClient;
use crate::error::ClusterError;
use crate::object::{ManagedObject, ObjectKey, ResourceKind};

/// The kind-specific half of a controller.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Error type surfaced to the event loop.
    type Error: std::error::Error + From<ClusterError> + Send + Sync + 'static;

    /// Kind of the declared object this reconciler handles.
    fn kind(&self) -> ResourceKind;

    /// Drives live state toward the declared object.
    async fn converge(&self, object: ManagedObject) -> Result<(), Self::Error>;

    /// Removes whatever the declared object left behind. Must succeed when
    /// nothing exists.
    async fn cleanup(&self, key: &ObjectKey) -> Result<(), Self::Error>;
}

/// What a successful reconcile did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The declared object exists and was converged.
    Converged,
    /// The declared object is gone and cleanup ran.
    CleanedUp,
}

/// Fetch-and-branch wrapper around a [`Reconciler`].
pub struct Dispatcher<R> {
    client: DynClusterClient,
    reconciler: R,
    deadline: Option<Duration>,
}

impl<R: Reconciler> Dispatcher<R> {
    /// Creates a dispatcher without a per-reconcile deadline.
    #[must_use]
    pub fn new(client: DynClusterClient, reconciler: R) -> Self {
        Self {
            client,
            reconciler,
            deadline: None,
        }
    }

    /// Bounds each reconcile. An expired reconcile fails with a timeout error.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The wrapped reconciler.
    pub fn reconciler(&self) -> &R {
        &self.reconciler
    }

    /// Reconciles one identity.
    ///
    /// # Errors
    ///
    /// Returns the converge error (or a fetch error) so the event loop can
    /// back off and retry. Cleanup errors are logged, not returned.
    pub async fn reconcile(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReconcileOutcome, R::Error> {
        let key = ObjectKey::new(self.reconciler.kind(), namespace, name);
        let span = info_span!(
            "reconcile",
            kind = %key.kind,
            namespace = %key.namespace,
            name = %key.name
        );

        let run = self.run(&key).instrument(span);
        match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, run).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(object = %key, ?deadline, "Reconcile deadline exceeded");
                    Err(ClusterError::timeout(format!("reconcile {key}")).into())
                }
            },
            None => run.await,
        }
    }

    async fn run(&self, key: &ObjectKey) -> Result<ReconcileOutcome, R::Error> {
        match self.client.get(key).await? {
            Some(object) => {
                self.reconciler.converge(object).await.inspect_err(|err| {
                    error!(error = %err, operation = "converge", "Reconcile failed");
                })?;
                debug!("Reconcile converged");
                Ok(ReconcileOutcome::Converged)
            }
            None => {
                if let Err(err) = self.reconciler.cleanup(key).await {
                    warn!(error = %err, operation = "cleanup", "Cleanup failed, object already gone");
                }
                debug!("Reconcile cleaned up");
                Ok(ReconcileOutcome::CleanedUp)
            }
        }
    }
}
