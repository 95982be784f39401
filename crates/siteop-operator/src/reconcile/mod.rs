//! Reconcilers plugged into [`siteop_core::Dispatcher`].
//!
//! - [`DatabaseReconciler`]: runs the database provisioner
//! - [`SiteReconciler`]: turns a Site's database requests into
//!   `PostgresDatabase` children

mod database;
mod site;

pub use database::DatabaseReconciler;
pub use site::{SiteReconciler, SubjectUrlSettings, child_name};
