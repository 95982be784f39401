//! Password resolution from Kubernetes Secrets.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use k8s_openapi::api::core::v1::Secret;
use siteop_core::{DynClusterClient, ObjectKey};
use siteop_db_postgres::Password;
use tracing::{debug, instrument};

use crate::error::{ReconcileError, Result};

/// Looks up a single value in a secret.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Returns the value stored under `key` in secret `namespace/name`.
    ///
    /// # Errors
    ///
    /// Returns a secret error if the secret or the key is missing, or the
    /// value is not UTF-8.
    async fn resolve(&self, namespace: &str, name: &str, key: &str) -> Result<Password>;
}

/// Reads `v1/Secret` objects through the cluster client.
pub struct ClusterSecretResolver {
    client: DynClusterClient,
}

impl ClusterSecretResolver {
    pub fn new(client: DynClusterClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretResolver for ClusterSecretResolver {
    #[instrument(skip(self))]
    async fn resolve(&self, namespace: &str, name: &str, key: &str) -> Result<Password> {
        let object = self
            .client
            .get(&ObjectKey::of::<Secret>(namespace, name))
            .await?
            .ok_or_else(|| ReconcileError::secret(namespace, name, "not found"))?;
        let secret: Secret = object.to_resource()?;

        if let Some(value) = secret.data.as_ref().and_then(|data| data.get(key)) {
            let text = String::from_utf8(value.0.clone()).map_err(|_| {
                ReconcileError::secret(namespace, name, format!("key {key:?} is not UTF-8"))
            })?;
            debug!("Resolved password from secret data");
            return Ok(Password::new(text));
        }
        if let Some(value) = secret.string_data.as_ref().and_then(|data| data.get(key)) {
            return Ok(Password::new(value.clone()));
        }
        Err(ReconcileError::secret(
            namespace,
            name,
            format!("key {key:?} not found"),
        ))
    }
}

/// Encodes secret data the way the API server stores it, for building
/// Secret objects by hand.
pub fn encode_secret_value(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}
