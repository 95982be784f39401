//! PostgreSQL administration client for the Site operator.
//!
//! This crate provides everything the database provisioner needs to talk to
//! a PostgreSQL server, using sqlx for the wire protocol.
//!
//! # Example
//!
//! ```ignore
//! use siteop_db_postgres::{DatabaseClient, Identifier, PgClient, PgClientConfig, Probe};
//!
//! let client = PgClient::new(PgClientConfig::default());
//! let admin = siteop_db_postgres::connection::parse_url("postgres://admin:secret@db/postgres")?;
//! let exists = client
//!     .probe(&admin, &Probe::RoleExists { role: Identifier::parse("svc")? })
//!     .await?;
//! ```
//!
//! # Architecture
//!
//! - [`client`]: the [`DatabaseClient`] trait and the sqlx [`PgClient`]
//! - [`statement`]: typed [`Statement`]s and [`Probe`]s and their rendering
//! - [`identifier`]: the identifier allow-list and reserved keywords
//! - [`connection`]: connection URL parsing and the subject URL convention
//! - [`config`]: per-call deadlines
//! - [`error`]: error types and SQLSTATE classification

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod identifier;
pub mod statement;

// Re-export main types
pub use client::{DatabaseClient, DynDatabaseClient, PgClient};
pub use config::PgClientConfig;
pub use error::{PostgresError, Result};
pub use identifier::{Identifier, IdentifierError};
pub use statement::{ExtensionName, Password, Probe, Sql, Statement};
