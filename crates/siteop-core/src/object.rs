//! Cluster object model shared by every controller.
//!
//! Objects are handled as a [`ManagedObject`]: standard Kubernetes metadata plus
//! the remaining top-level fields (`spec`, `data`, `status`, ...) kept as JSON.
//! Typed resources convert to and from this shape through serde.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClusterError, Result};

/// Label stamped on every object written by the convergence engine.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`].
pub const MANAGED_BY_VALUE: &str = "siteop";

/// API coordinates of a resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKind {
    /// API group, empty for the core group.
    pub group: String,
    /// API version within the group.
    pub version: String,
    /// Kind name, e.g. `ConfigMap`.
    pub kind: String,
    /// Lower-case plural used in API paths.
    pub plural: String,
}

impl ResourceKind {
    /// Creates a new kind description.
    #[must_use]
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        plural: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            plural: plural.into(),
        }
    }

    /// Describes a statically typed resource.
    #[must_use]
    pub fn of<K: Resource<DynamicType = ()>>() -> Self {
        Self {
            group: K::group(&()).into_owned(),
            version: K::version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            plural: K::plural(&()).into_owned(),
        }
    }

    /// Returns the `apiVersion` string (`group/version` or bare `version`).
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

/// Identity of a namespaced object: kind + namespace + name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    /// Creates a new object key.
    #[must_use]
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a typed resource.
    #[must_use]
    pub fn of<K: Resource<DynamicType = ()>>(
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::new(ResourceKind::of::<K>(), namespace, name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind.kind, self.namespace, self.name)
    }
}

/// A cluster-resident object as seen by the convergence engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagedObject {
    #[serde(rename = "apiVersion", default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Every other top-level field.
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl ManagedObject {
    /// Creates an empty object pre-populated with the key's identity.
    #[must_use]
    pub fn new(key: &ObjectKey) -> Self {
        let mut object = Self::default();
        object.stamp_identity(key);
        object
    }

    /// Converts a typed resource into a managed object.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the resource cannot be represented as JSON.
    pub fn from_resource<K: Serialize>(resource: &K) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::to_value(resource)?)?)
    }

    /// Converts this object into a typed resource.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the body does not match the type.
    pub fn to_resource<K: DeserializeOwned>(&self) -> Result<K> {
        Ok(serde_json::from_value(serde_json::to_value(self)?)?)
    }

    /// Overwrites identity fields from the key.
    pub fn stamp_identity(&mut self, key: &ObjectKey) {
        self.api_version = key.kind.api_version();
        self.kind = key.kind.kind.clone();
        self.metadata.name = Some(key.name.clone());
        self.metadata.namespace = Some(key.namespace.clone());
    }

    /// Object name, empty if unset.
    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Object namespace, empty if unset.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }

    /// Resource version observed when the object was read.
    #[must_use]
    pub fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }

    /// Mutable label map, created on first use.
    pub fn labels_mut(&mut self) -> &mut BTreeMap<String, String> {
        self.metadata.labels.get_or_insert_with(BTreeMap::new)
    }

    /// Returns the value of a label.
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .map(String::as_str)
    }

    /// Returns true if every selector entry matches a label on this object.
    #[must_use]
    pub fn matches_labels(&self, selector: &BTreeMap<String, String>) -> bool {
        selector
            .iter()
            .all(|(key, value)| self.label(key) == Some(value.as_str()))
    }

    /// Sets a top-level body field such as `spec` or `data`.
    pub fn set_field(&mut self, field: impl Into<String>, value: Value) {
        self.body.insert(field.into(), value);
    }

    /// Returns a top-level body field.
    #[must_use]
    pub fn field(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    /// True once the API server has marked the object for deletion.
    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Returns true if the finalizer is present.
    #[must_use]
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|list| list.iter().any(|f| f == finalizer))
    }

    /// Owner reference pointing at this object, for stamping onto children.
    ///
    /// # Errors
    ///
    /// Returns an invalid-object error if the object has not been persisted
    /// yet and therefore carries no UID.
    pub fn owner_reference(&self) -> Result<OwnerReference> {
        let uid = self.metadata.uid.clone().ok_or_else(|| {
            ClusterError::invalid(format!("{} {} has no uid", self.kind, self.name()))
        })?;
        Ok(OwnerReference {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name().to_string(),
            uid,
            controller: Some(true),
            block_owner_deletion: Some(true),
        })
    }
}
