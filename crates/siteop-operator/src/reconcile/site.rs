//! Site reconciliation.
//!
//! Each entry of `spec.databases` becomes one `PostgresDatabase` child named
//! `<site>-<component>`, owned by the Site and labelled with both names.
//! The child's URL follows the subject URL convention: role and database
//! are the sanitized component name on the administrative server.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use siteop_core::{
    ClusterError, DynClusterClient, MANAGED_BY_LABEL, MANAGED_BY_VALUE, ManagedObject, ObjectKey,
    Reconciler, ResourceKind, converge_object, delete_if_exists, delete_managed,
};
use siteop_db_postgres::Identifier;
use siteop_db_postgres::connection::subject_url;
use tracing::{debug, info, instrument};
use url::Url;

use crate::crd::{
    COMPONENT_LABEL, DatabaseRequest, PostgresDatabase, PostgresDatabaseSpec, SITE_LABEL, Site,
};
use crate::error::ReconcileError;

/// Inputs of the subject URL convention.
#[derive(Debug, Clone)]
pub struct SubjectUrlSettings {
    /// Administrative URL; host, port and query come from here.
    pub main_url: Url,
    pub ssl_mode: Option<String>,
}

pub struct SiteReconciler {
    client: DynClusterClient,
    urls: SubjectUrlSettings,
}

impl SiteReconciler {
    pub fn new(client: DynClusterClient, urls: SubjectUrlSettings) -> Self {
        Self { client, urls }
    }

    /// The `PostgresDatabase` spec generated for one request.
    pub fn database_spec(
        &self,
        request: &DatabaseRequest,
    ) -> Result<PostgresDatabaseSpec, ReconcileError> {
        let search_path = request
            .search_path
            .as_deref()
            .map(Identifier::parse)
            .transpose()?;
        let url = subject_url(
            &self.urls.main_url,
            &request.component,
            search_path.as_ref(),
            self.urls.ssl_mode.as_deref(),
        )?;

        Ok(PostgresDatabaseSpec {
            url: url.to_string(),
            schemas: request.schemas.clone(),
            extensions: request.extensions.clone(),
            teardown: request.teardown.clone(),
            secret: request.secret.clone(),
            secret_password_key: request.secret_password_key.clone(),
            ..Default::default()
        })
    }

    async fn prune(
        &self,
        namespace: &str,
        site: &str,
        wanted: &BTreeSet<String>,
    ) -> Result<usize, ReconcileError> {
        let kind = ResourceKind::of::<PostgresDatabase>();
        let selector = BTreeMap::from([
            (SITE_LABEL.to_string(), site.to_string()),
            (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
        ]);

        let mut pruned = 0;
        for child in self.client.list(&kind, namespace, &selector).await? {
            if wanted.contains(child.name()) {
                continue;
            }
            let key = ObjectKey::new(kind.clone(), namespace, child.name());
            if delete_if_exists(self.client.as_ref(), &key).await? {
                pruned += 1;
            }
        }
        Ok(pruned)
    }
}

/// Child name for a component: `<site>-<component>` in DNS label form.
pub fn child_name(site: &str, component: &str) -> String {
    let component: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    format!("{site}-{component}")
}

#[async_trait]
impl Reconciler for SiteReconciler {
    type Error = ReconcileError;

    fn kind(&self) -> ResourceKind {
        ResourceKind::of::<Site>()
    }

    #[instrument(skip_all, fields(site = %object.name()))]
    async fn converge(&self, object: ManagedObject) -> Result<(), ReconcileError> {
        let site: Site = object.to_resource()?;
        let owner = object.owner_reference()?;
        let namespace = object.namespace();
        let site_name = object.name();

        let mut wanted = BTreeSet::new();
        let mut changed = 0;
        for request in &site.spec.databases {
            let spec = serde_json::to_value(self.database_spec(request)?)
                .map_err(ClusterError::from)?;
            let name = child_name(site_name, &request.component);
            let key = ObjectKey::of::<PostgresDatabase>(namespace, &name);

            let wrote = converge_object(
                self.client.as_ref(),
                &key,
                std::slice::from_ref(&owner),
                |child| {
                    let labels = child.labels_mut();
                    labels.insert(SITE_LABEL.to_string(), site_name.to_string());
                    labels.insert(COMPONENT_LABEL.to_string(), request.component.clone());
                    child.set_field("spec", spec);
                    Ok::<_, ReconcileError>(())
                },
            )
            .await?;
            if wrote {
                changed += 1;
            }
            wanted.insert(name);
        }

        let pruned = self.prune(namespace, site_name, &wanted).await?;
        if changed > 0 || pruned > 0 {
            info!(changed, pruned, "Site databases converged");
        } else {
            debug!("Site databases already converged");
        }
        Ok(())
    }

    async fn cleanup(&self, key: &ObjectKey) -> Result<(), ReconcileError> {
        let selector = BTreeMap::from([(SITE_LABEL.to_string(), key.name.clone())]);
        let deleted = delete_managed(
            self.client.as_ref(),
            &ResourceKind::of::<PostgresDatabase>(),
            &key.namespace,
            &selector,
        )
        .await?;
        debug!(deleted, "Removed databases of deleted site");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_name() {
        assert_eq!(child_name("main", "web"), "main-web");
        assert_eq!(child_name("main", "audit_log"), "main-audit-log");
        assert_eq!(child_name("main", "Package.Repo"), "main-package-repo");
    }
}
