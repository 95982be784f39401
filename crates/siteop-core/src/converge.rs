//! Convergence engine: make one managed object match a caller-shaped target.
//!
//! Every controller builds its children (ConfigMaps, Deployments, child custom
//! resources, ...) through [`converge_object`]. The engine owns three things
//! callers must not get wrong:
//!
//! - the object's identity is re-stamped after shaping
//! - owner references and the managed-by label are stamped after shaping
//! - a write happens only when the shaped object differs from the live one
//!
//! Conflicts are not retried here. A `ClusterError::Conflict` propagates to
//! the dispatcher and the event loop re-delivers the reconcile.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use tracing::{debug, info, instrument};

use crate::client::ClusterClient;
use crate::error::ClusterError;
use crate::object::{MANAGED_BY_LABEL, MANAGED_BY_VALUE, ManagedObject, ObjectKey, ResourceKind};

/// Fetches-or-initializes the object at `key`, applies `mutate`, and persists
/// the result only if it changed.
///
/// Returns `true` if a create or update was issued.
///
/// # Errors
///
/// Returns the shaping function's error unchanged, or any cluster error
/// (including `Conflict` when the object moved since it was read).
#[instrument(skip_all, fields(kind = %key.kind, namespace = %key.namespace, name = %key.name))]
pub async fn converge_object<F, E>(
    client: &dyn ClusterClient,
    key: &ObjectKey,
    owners: &[OwnerReference],
    mutate: F,
) -> Result<bool, E>
where
    F: FnOnce(&mut ManagedObject) -> Result<(), E> + Send,
    E: From<ClusterError>,
{
    let live = client.get(key).await?;
    let mut desired = live.clone().unwrap_or_else(|| ManagedObject::new(key));

    mutate(&mut desired)?;
    stamp(&mut desired, key, owners);

    match live {
        Some(live) => {
            desired.metadata.resource_version = live.metadata.resource_version.clone();
            desired.metadata.uid = live.metadata.uid.clone();
            if desired == live {
                debug!("Object already converged");
                return Ok(false);
            }
            client.update(&key.kind, &desired).await?;
            info!("Updated managed object");
        }
        None => {
            client.create(&key.kind, &desired).await?;
            info!("Created managed object");
        }
    }

    Ok(true)
}

/// Creates the object if it is absent and never touches an existing one.
///
/// For objects whose creation-time fields must not be overwritten (for
/// example a volume claim bound to a physical disk). A concurrent create by
/// someone else counts as "already present".
///
/// Returns `true` if this call created the object.
///
/// # Errors
///
/// Returns the shaping function's error or any cluster error other than
/// `AlreadyExists`.
#[instrument(skip_all, fields(kind = %key.kind, namespace = %key.namespace, name = %key.name))]
pub async fn ensure_exists<F, E>(
    client: &dyn ClusterClient,
    key: &ObjectKey,
    owners: &[OwnerReference],
    build: F,
) -> Result<bool, E>
where
    F: FnOnce(&mut ManagedObject) -> Result<(), E> + Send,
    E: From<ClusterError>,
{
    if client.get(key).await?.is_some() {
        debug!("Object exists, leaving untouched");
        return Ok(false);
    }

    let mut object = ManagedObject::new(key);
    build(&mut object)?;
    stamp(&mut object, key, owners);

    match client.create(&key.kind, &object).await {
        Ok(_) => {
            info!("Created managed object");
            Ok(true)
        }
        Err(err) if err.is_already_exists() => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Deletes the object if present. Missing objects are not an error.
///
/// # Errors
///
/// Returns any cluster error other than "not found".
#[instrument(skip_all, fields(kind = %key.kind, namespace = %key.namespace, name = %key.name))]
pub async fn delete_if_exists(client: &dyn ClusterClient, key: &ObjectKey) -> Result<bool, ClusterError> {
    let deleted = client.delete(key).await?;
    if deleted {
        info!("Deleted managed object");
    }
    Ok(deleted)
}

/// Deletes every object of `kind` in `namespace` that this operator manages
/// and whose labels match `selector`.
///
/// Returns the number of objects deleted.
///
/// # Errors
///
/// Stops at the first failing delete and returns its error.
#[instrument(skip(client, selector), fields(kind = %kind))]
pub async fn delete_managed(
    client: &dyn ClusterClient,
    kind: &ResourceKind,
    namespace: &str,
    selector: &BTreeMap<String, String>,
) -> Result<usize, ClusterError> {
    let mut selector = selector.clone();
    selector.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());

    let mut deleted = 0;
    for object in client.list(kind, namespace, &selector).await? {
        let key = ObjectKey::new(kind.clone(), namespace, object.name());
        if client.delete(&key).await? {
            deleted += 1;
        }
    }

    if deleted > 0 {
        info!(deleted, "Deleted managed objects");
    }
    Ok(deleted)
}

fn stamp(object: &mut ManagedObject, key: &ObjectKey, owners: &[OwnerReference]) {
    object.stamp_identity(key);
    if !owners.is_empty() {
        object.metadata.owner_references = Some(owners.to_vec());
    }
    object
        .labels_mut()
        .insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
}
