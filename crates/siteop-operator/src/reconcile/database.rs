//! PostgresDatabase reconciliation.

use std::sync::Arc;

use async_trait::async_trait;
use siteop_core::{ManagedObject, ObjectKey, Reconciler, ResourceKind};
use tracing::debug;

use crate::crd::PostgresDatabase;
use crate::error::ReconcileError;
use crate::provisioner::DatabaseProvisioner;

/// Hands every present `PostgresDatabase` to the provisioner.
///
/// Nothing is left to clean up once the object is gone: the finalizer keeps
/// it around until teardown has run.
pub struct DatabaseReconciler {
    provisioner: Arc<DatabaseProvisioner>,
}

impl DatabaseReconciler {
    pub fn new(provisioner: Arc<DatabaseProvisioner>) -> Self {
        Self { provisioner }
    }
}

#[async_trait]
impl Reconciler for DatabaseReconciler {
    type Error = ReconcileError;

    fn kind(&self) -> ResourceKind {
        ResourceKind::of::<PostgresDatabase>()
    }

    async fn converge(&self, object: ManagedObject) -> Result<(), ReconcileError> {
        let outcome = self.provisioner.provision(&object).await?;
        debug!(?outcome, "Provisioner pass finished");
        Ok(())
    }

    async fn cleanup(&self, key: &ObjectKey) -> Result<(), ReconcileError> {
        debug!(object = %key, "PostgresDatabase gone, teardown already ran");
        Ok(())
    }
}
