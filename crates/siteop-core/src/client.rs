//! The cluster capability set every controller depends on.
//!
//! The operator never talks to the API server directly; it goes through a
//! [`ClusterClient`], supplied by the binary (kube-backed) or by tests
//! (in-memory).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::object::{ManagedObject, ObjectKey, ResourceKind};

/// Get / create / update / delete / patch / list over namespaced objects.
///
/// Implementations must be thread-safe (`Send + Sync`); different object
/// identities are reconciled concurrently.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Reads an object.
    ///
    /// Returns `None` if the object does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing objects.
    async fn get(&self, key: &ObjectKey) -> Result<Option<ManagedObject>>;

    /// Creates a new object.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::AlreadyExists` if an object with the same identity exists.
    async fn create(&self, kind: &ResourceKind, object: &ManagedObject) -> Result<ManagedObject>;

    /// Replaces an existing object.
    ///
    /// The object's `metadata.resourceVersion` must match the stored one.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::Conflict` on a resource version mismatch and
    /// `ClusterError::NotFound` if the object is gone.
    async fn update(&self, kind: &ResourceKind, object: &ManagedObject) -> Result<ManagedObject>;

    /// Deletes an object.
    ///
    /// Returns `false` if there was nothing to delete.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues.
    async fn delete(&self, key: &ObjectKey) -> Result<bool>;

    /// Applies a JSON merge patch (RFC 7386).
    ///
    /// A `metadata.resourceVersion` inside the patch acts as a precondition.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::NotFound` if the object is gone and
    /// `ClusterError::Conflict` if the precondition fails.
    async fn patch(&self, key: &ObjectKey, patch: &Value) -> Result<ManagedObject>;

    /// Lists objects of a kind in a namespace whose labels match `selector`.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues.
    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<ManagedObject>>;
}

/// Type alias for a shareable cluster client.
pub type DynClusterClient = Arc<dyn ClusterClient>;
