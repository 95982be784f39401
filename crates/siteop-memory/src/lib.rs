//! In-memory backends for the Site operator.
//!
//! [`InMemoryCluster`] stands in for the Kubernetes API server and
//! [`InMemoryPostgres`] for a PostgreSQL server. Both keep enough real
//! behavior (resource versions, finalizers, owner cascade, authentication,
//! SQLSTATE codes) for the convergence engine and the provisioner to be
//! exercised end to end without a cluster or Docker.

pub mod cluster;
pub mod database;

pub use cluster::InMemoryCluster;
pub use database::{ExecutedStatement, InMemoryPostgres};
