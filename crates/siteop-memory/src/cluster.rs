//! In-memory [`ClusterClient`] with API-server-like write semantics.
//!
//! - every write bumps a global resource version; stale writes conflict
//! - deleting an object that carries finalizers only sets its deletion
//!   timestamp; it disappears once the last finalizer is removed
//! - removing an object garbage-collects the objects it owns
//! - all successful writes are counted, so tests can assert "no write"

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use siteop_core::{ClusterClient, ClusterError, ManagedObject, ObjectKey, ResourceKind, Result};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::RwLock;

/// Storage key: group, kind, namespace, name.
type StoreKey = (String, String, String, String);

fn store_key(kind: &ResourceKind, namespace: &str, name: &str) -> StoreKey {
    (
        kind.group.clone(),
        kind.kind.clone(),
        namespace.to_string(),
        name.to_string(),
    )
}

fn key_of(key: &ObjectKey) -> StoreKey {
    store_key(&key.kind, &key.namespace, &key.name)
}

/// In-memory cluster state.
#[derive(Debug)]
pub struct InMemoryCluster {
    objects: RwLock<BTreeMap<StoreKey, ManagedObject>>,
    version_counter: AtomicU64,
    writes: AtomicU64,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            version_counter: AtomicU64::new(1),
            writes: AtomicU64::new(0),
        }
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// True if the object is stored (deleting or not).
    pub async fn contains(&self, key: &ObjectKey) -> bool {
        self.objects.read().await.contains_key(&key_of(key))
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// True if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn next_version(&self) -> String {
        self.version_counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    /// Removes an object and garbage-collects its dependents.
    fn collect(&self, objects: &mut BTreeMap<StoreKey, ManagedObject>, key: StoreKey) -> Result<()> {
        let mut pending = vec![key];
        while let Some(key) = pending.pop() {
            let Some(removed) = objects.remove(&key) else {
                continue;
            };
            let Some(uid) = removed.metadata.uid else {
                continue;
            };

            let dependents: Vec<StoreKey> = objects
                .iter()
                .filter(|(_, object)| {
                    object
                        .metadata
                        .owner_references
                        .iter()
                        .flatten()
                        .any(|owner| owner.uid == uid)
                })
                .map(|(key, _)| key.clone())
                .collect();

            for dependent in dependents {
                let Some(object) = objects.get_mut(&dependent) else {
                    continue;
                };
                if has_finalizers(object) {
                    mark_deleting(object)?;
                    object.metadata.resource_version = Some(self.next_version());
                } else {
                    pending.push(dependent);
                }
            }
        }
        Ok(())
    }
}

fn has_finalizers(object: &ManagedObject) -> bool {
    object
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|list| !list.is_empty())
}

fn mark_deleting(object: &mut ManagedObject) -> Result<()> {
    if object.is_deleting() {
        return Ok(());
    }
    let now = OffsetDateTime::now_utc();
    let now = now.replace_nanosecond(0).unwrap_or(now);
    let stamp = now
        .format(&Rfc3339)
        .map_err(|e| ClusterError::api(format!("failed to format deletion timestamp: {e}")))?;

    let mut value = serde_json::to_value(&*object)?;
    value["metadata"]["deletionTimestamp"] = Value::String(stamp);
    *object = serde_json::from_value(value)?;
    Ok(())
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    async fn get(&self, key: &ObjectKey) -> Result<Option<ManagedObject>> {
        Ok(self.objects.read().await.get(&key_of(key)).cloned())
    }

    async fn create(&self, kind: &ResourceKind, object: &ManagedObject) -> Result<ManagedObject> {
        if object.name().is_empty() {
            return Err(ClusterError::invalid("metadata.name is required"));
        }
        let key = ObjectKey::new(kind.clone(), object.namespace(), object.name());
        let mut objects = self.objects.write().await;
        let store = key_of(&key);
        if objects.contains_key(&store) {
            return Err(ClusterError::already_exists(&key));
        }

        let mut stored = object.clone();
        let version = self.next_version();
        stored.metadata.uid = Some(format!("uid-{version}"));
        stored.metadata.resource_version = Some(version);
        stored.metadata.deletion_timestamp = None;
        objects.insert(store, stored.clone());
        self.record_write();
        Ok(stored)
    }

    async fn update(&self, kind: &ResourceKind, object: &ManagedObject) -> Result<ManagedObject> {
        let key = ObjectKey::new(kind.clone(), object.namespace(), object.name());
        let store = key_of(&key);
        let mut objects = self.objects.write().await;
        let current = objects
            .get(&store)
            .ok_or_else(|| ClusterError::not_found(&key))?;

        if let Some(expected) = object.resource_version()
            && Some(expected) != current.resource_version()
        {
            return Err(ClusterError::conflict(
                &key,
                format!(
                    "resourceVersion {expected} is stale, current is {}",
                    current.resource_version().unwrap_or_default()
                ),
            ));
        }

        let mut stored = object.clone();
        stored.metadata.uid = current.metadata.uid.clone();
        stored.metadata.deletion_timestamp = current.metadata.deletion_timestamp.clone();
        stored.metadata.resource_version = Some(self.next_version());

        let finished = stored.is_deleting() && !has_finalizers(&stored);
        objects.insert(store.clone(), stored.clone());
        if finished {
            self.collect(&mut objects, store)?;
        }
        self.record_write();
        Ok(stored)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<bool> {
        let store = key_of(key);
        let mut objects = self.objects.write().await;
        let Some(object) = objects.get_mut(&store) else {
            return Ok(false);
        };

        if has_finalizers(object) {
            if !object.is_deleting() {
                mark_deleting(object)?;
                object.metadata.resource_version = Some(self.next_version());
            }
        } else {
            self.collect(&mut objects, store)?;
        }
        self.record_write();
        Ok(true)
    }

    async fn patch(&self, key: &ObjectKey, patch: &Value) -> Result<ManagedObject> {
        let store = key_of(key);
        let mut objects = self.objects.write().await;
        let current = objects
            .get(&store)
            .ok_or_else(|| ClusterError::not_found(key))?;

        if let Some(expected) = patch
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str)
            && Some(expected) != current.resource_version()
        {
            return Err(ClusterError::conflict(
                key,
                format!("resourceVersion precondition {expected} failed"),
            ));
        }

        let mut document = serde_json::to_value(current)?;
        json_patch::merge(&mut document, patch);
        let mut stored: ManagedObject = serde_json::from_value(document)?;
        stored.metadata.uid = current.metadata.uid.clone();
        stored.metadata.deletion_timestamp = current.metadata.deletion_timestamp.clone();
        stored.metadata.resource_version = Some(self.next_version());
        stored.stamp_identity(key);

        let finished = stored.is_deleting() && !has_finalizers(&stored);
        objects.insert(store.clone(), stored.clone());
        if finished {
            self.collect(&mut objects, store)?;
        }
        self.record_write();
        Ok(stored)
    }

    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<ManagedObject>> {
        let objects = self.objects.read().await;
        Ok(objects
            .iter()
            .filter(|((group, kind_name, ns, _), object)| {
                group == &kind.group
                    && kind_name == &kind.kind
                    && ns == namespace
                    && object.matches_labels(selector)
            })
            .map(|(_, object)| object.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use serde_json::json;
    use tokio_test::block_on;

    fn config_map(name: &str) -> (ObjectKey, ManagedObject) {
        let key = ObjectKey::of::<ConfigMap>("site", name);
        let mut object = ManagedObject::new(&key);
        object.set_field("data", json!({ "k": "v" }));
        (key, object)
    }

    #[test]
    fn create_assigns_identity_and_rejects_duplicates() {
        let cluster = InMemoryCluster::new();
        let (key, object) = config_map("cm");
        block_on(async {
            let stored = cluster.create(&key.kind, &object).await.unwrap();
            assert!(stored.metadata.uid.is_some());
            assert!(stored.resource_version().is_some());

            let err = cluster.create(&key.kind, &object).await.unwrap_err();
            assert!(err.is_already_exists());
            assert_eq!(cluster.writes(), 1);
            assert_eq!(cluster.len().await, 1);
        });
    }

    #[test]
    fn merge_patch_removes_null_fields() {
        let cluster = InMemoryCluster::new();
        let (key, object) = config_map("cm");
        block_on(async {
            cluster.create(&key.kind, &object).await.unwrap();
            let patched = cluster
                .patch(&key, &json!({ "data": { "k": null, "other": "x" } }))
                .await
                .unwrap();
            assert_eq!(patched.field("data"), Some(&json!({ "other": "x" })));
            assert_eq!(patched.name(), "cm");
        });
    }

    #[test]
    fn delete_with_finalizer_waits_for_its_removal() {
        let cluster = InMemoryCluster::new();
        let (key, object) = config_map("cm");
        block_on(async {
            cluster.create(&key.kind, &object).await.unwrap();
            cluster
                .patch(&key, &json!({ "metadata": { "finalizers": ["a/b"] } }))
                .await
                .unwrap();

            assert!(cluster.delete(&key).await.unwrap());
            let held = cluster.get(&key).await.unwrap().unwrap();
            assert!(held.is_deleting());

            cluster
                .patch(&key, &json!({ "metadata": { "finalizers": null } }))
                .await
                .unwrap();
            assert!(!cluster.contains(&key).await);
            assert!(!cluster.delete(&key).await.unwrap());
        });
    }
}
