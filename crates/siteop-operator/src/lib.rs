//! Site operator: reconcilers, database provisioning and process wiring.
//!
//! # Architecture
//!
//! - [`crd`]: the `PostgresDatabase` and `Site` custom resources
//! - [`provisioner`]: the database provisioning state machine
//! - [`reconcile`]: reconcilers run by [`siteop_core::Dispatcher`]
//! - [`secrets`]: password lookup in Kubernetes Secrets
//! - [`kube_client`]: the API-server [`siteop_core::ClusterClient`]
//! - [`controller`]: kube-runtime controllers as the event loop
//! - [`config`], [`observability`], [`error`]: the ambient stack

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod kube_client;
pub mod observability;
pub mod provisioner;
pub mod reconcile;
pub mod secrets;

pub use crd::{PostgresDatabase, PostgresDatabaseSpec, Site, SiteSpec};
pub use error::{ErrorCategory, ReconcileError, Result};
pub use provisioner::{DATABASE_FINALIZER, DatabaseProvisioner, LiveState, ProvisionOutcome};
pub use reconcile::{DatabaseReconciler, SiteReconciler, SubjectUrlSettings};
pub use secrets::{ClusterSecretResolver, SecretResolver};
