//! [`ClusterClient`] backed by the Kubernetes API server.

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::core::ApiResource;
use kube::Client;
use serde_json::Value;
use siteop_core::{ClusterClient, ClusterError, ManagedObject, ObjectKey, ResourceKind, Result};
use tracing::{debug, instrument};

/// Untyped access to any namespaced kind.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: &ResourceKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &api_resource(kind))
    }
}

fn api_resource(kind: &ResourceKind) -> ApiResource {
    ApiResource {
        group: kind.group.clone(),
        version: kind.version.clone(),
        api_version: kind.api_version(),
        kind: kind.kind.clone(),
        plural: kind.plural.clone(),
    }
}

fn to_dynamic(object: &ManagedObject) -> Result<DynamicObject> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

fn from_dynamic(object: DynamicObject) -> Result<ManagedObject> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

/// Maps API server failures onto the cluster error taxonomy.
fn map_error(key: &ObjectKey, err: kube::Error) -> ClusterError {
    match err {
        kube::Error::Api(response) => match response.code {
            404 => ClusterError::not_found(key),
            409 if response.reason == "AlreadyExists" => ClusterError::already_exists(key),
            409 => ClusterError::conflict(key, response.message),
            400 | 422 => ClusterError::invalid(format!("{key}: {}", response.message)),
            _ => ClusterError::api(format!("{key}: {}", response.message)),
        },
        other => ClusterError::api(format!("{key}: {other}")),
    }
}

fn selector_string(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    #[instrument(skip(self), fields(object = %key))]
    async fn get(&self, key: &ObjectKey) -> Result<Option<ManagedObject>> {
        let found = self
            .api(&key.kind, &key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(|e| map_error(key, e))?;
        found.map(from_dynamic).transpose()
    }

    async fn create(&self, kind: &ResourceKind, object: &ManagedObject) -> Result<ManagedObject> {
        let key = ObjectKey::new(kind.clone(), object.namespace(), object.name());
        let created = self
            .api(kind, object.namespace())
            .create(&PostParams::default(), &to_dynamic(object)?)
            .await
            .map_err(|e| map_error(&key, e))?;
        from_dynamic(created)
    }

    async fn update(&self, kind: &ResourceKind, object: &ManagedObject) -> Result<ManagedObject> {
        let key = ObjectKey::new(kind.clone(), object.namespace(), object.name());
        let replaced = self
            .api(kind, object.namespace())
            .replace(object.name(), &PostParams::default(), &to_dynamic(object)?)
            .await
            .map_err(|e| map_error(&key, e))?;
        from_dynamic(replaced)
    }

    #[instrument(skip(self), fields(object = %key))]
    async fn delete(&self, key: &ObjectKey) -> Result<bool> {
        match self
            .api(&key.kind, &key.namespace)
            .delete(&key.name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                debug!("Already deleted");
                Ok(false)
            }
            Err(e) => Err(map_error(key, e)),
        }
    }

    async fn patch(&self, key: &ObjectKey, patch: &Value) -> Result<ManagedObject> {
        let patched = self
            .api(&key.kind, &key.namespace)
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| map_error(key, e))?;
        from_dynamic(patched)
    }

    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<ManagedObject>> {
        let params = ListParams::default().labels(&selector_string(selector));
        let list = self
            .api(kind, namespace)
            .list(&params)
            .await
            .map_err(|e| ClusterError::api(format!("list {kind} in {namespace}: {e}")))?;
        list.items.into_iter().map(from_dynamic).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::core::ErrorResponse;
    use serde_json::json;

    fn response(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_error_mapping() {
        let key = ObjectKey::of::<ConfigMap>("site", "cm");
        assert!(map_error(&key, response(404, "NotFound")).is_not_found());
        assert!(map_error(&key, response(409, "AlreadyExists")).is_already_exists());
        assert!(map_error(&key, response(409, "Conflict")).is_conflict());
        assert!(matches!(
            map_error(&key, response(422, "Invalid")),
            ClusterError::Invalid { .. }
        ));
    }

    #[test]
    fn test_dynamic_conversion_keeps_body() {
        let key = ObjectKey::of::<ConfigMap>("site", "cm");
        let mut object = ManagedObject::new(&key);
        object.set_field("data", json!({"a": "b"}));

        let dynamic = to_dynamic(&object).unwrap();
        assert_eq!(dynamic.data["data"], json!({"a": "b"}));
        assert_eq!(dynamic.metadata.name.as_deref(), Some("cm"));

        let back = from_dynamic(dynamic).unwrap();
        assert_eq!(back, object);
    }

    #[test]
    fn test_selector_string() {
        let selector = BTreeMap::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]);
        assert_eq!(selector_string(&selector), "a=1,b=2");
        assert_eq!(api_resource(&ResourceKind::of::<ConfigMap>()).api_version, "v1");
    }
}
