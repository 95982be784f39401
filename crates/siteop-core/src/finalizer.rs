//! Finalizer add/remove through guarded merge patches.
//!
//! Both operations send the full finalizer list together with the resource
//! version that was read, so a concurrent writer causes a `Conflict` instead
//! of a lost update.

use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::client::ClusterClient;
use crate::error::Result;
use crate::object::{ManagedObject, ObjectKey};

/// Adds `finalizer` to the object if missing and returns the stored object.
///
/// # Errors
///
/// Returns `Conflict` if the object changed since `object` was read.
#[instrument(skip(client, object), fields(object = %key))]
pub async fn add_finalizer(
    client: &dyn ClusterClient,
    key: &ObjectKey,
    object: &ManagedObject,
    finalizer: &str,
) -> Result<ManagedObject> {
    if object.has_finalizer(finalizer) {
        debug!("Finalizer already present");
        return Ok(object.clone());
    }

    let mut finalizers = object.metadata.finalizers.clone().unwrap_or_default();
    finalizers.push(finalizer.to_string());

    let patched = client
        .patch(key, &finalizer_patch(object, &finalizers))
        .await?;
    info!("Added finalizer");
    Ok(patched)
}

/// Removes `finalizer` from the object if present and returns the stored
/// object.
///
/// # Errors
///
/// Returns `Conflict` if the object changed since `object` was read.
#[instrument(skip(client, object), fields(object = %key))]
pub async fn remove_finalizer(
    client: &dyn ClusterClient,
    key: &ObjectKey,
    object: &ManagedObject,
    finalizer: &str,
) -> Result<ManagedObject> {
    if !object.has_finalizer(finalizer) {
        debug!("Finalizer already absent");
        return Ok(object.clone());
    }

    let finalizers: Vec<String> = object
        .metadata
        .finalizers
        .iter()
        .flatten()
        .filter(|f| f.as_str() != finalizer)
        .cloned()
        .collect();

    let patched = client
        .patch(key, &finalizer_patch(object, &finalizers))
        .await?;
    info!("Removed finalizer");
    Ok(patched)
}

fn finalizer_patch(object: &ManagedObject, finalizers: &[String]) -> Value {
    json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": object.resource_version(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;

    #[test]
    fn test_patch_carries_resource_version() {
        let mut object = ManagedObject::new(&ObjectKey::of::<ConfigMap>("ns", "cm"));
        object.metadata.resource_version = Some("42".to_string());

        let patch = finalizer_patch(&object, &["a".to_string(), "b".to_string()]);
        assert_eq!(patch["metadata"]["resourceVersion"], "42");
        assert_eq!(patch["metadata"]["finalizers"], json!(["a", "b"]));
    }

    #[test]
    fn test_empty_list_is_explicit() {
        let object = ManagedObject::new(&ObjectKey::of::<ConfigMap>("ns", "cm"));
        let patch = finalizer_patch(&object, &[]);
        assert_eq!(patch["metadata"]["finalizers"], json!([]));
    }
}
