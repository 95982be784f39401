//! Core building blocks for the Site operator.
//!
//! This crate holds everything that is independent of a particular resource
//! kind or backend:
//!
//! - [`object`]: the [`ManagedObject`] model and object identities
//! - [`client`]: the [`ClusterClient`] capability trait
//! - [`converge`]: the convergence engine ([`converge_object`] and friends)
//! - [`finalizer`]: guarded finalizer add/remove
//! - [`dispatch`]: the per-kind [`Dispatcher`]
//!
//! # Example
//!
//! ```ignore
//! use siteop_core::{ObjectKey, converge_object};
//! use k8s_openapi::api::core::v1::ConfigMap;
//!
//! let key = ObjectKey::of::<ConfigMap>("site", "web-config");
//! let changed = converge_object(client.as_ref(), &key, &[owner], |object| {
//!     object.set_field("data", serde_json::json!({"app.toml": rendered}));
//!     Ok::<_, siteop_core::ClusterError>(())
//! })
//! .await?;
//! ```

pub mod client;
pub mod converge;
pub mod dispatch;
pub mod error;
pub mod finalizer;
pub mod object;

pub use client::{ClusterClient, DynClusterClient};
pub use converge::{converge_object, delete_if_exists, delete_managed, ensure_exists};
pub use dispatch::{Dispatcher, ReconcileOutcome, Reconciler};
pub use error::{ClusterError, Result};
pub use finalizer::{add_finalizer, remove_finalizer};
pub use object::{MANAGED_BY_LABEL, MANAGED_BY_VALUE, ManagedObject, ObjectKey, ResourceKind};

// Re-exported so downstream crates name the same metadata types.
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
