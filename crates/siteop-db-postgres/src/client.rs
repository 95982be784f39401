//! The administrative database client.
//!
//! [`DatabaseClient`] is the seam between the provisioner and a PostgreSQL
//! server. [`PgClient`] is the sqlx implementation: it opens one connection
//! per call and closes it afterward. Call volume is bounded by reconcile
//! frequency, so there is no pool.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx_core::connection::Connection;
use sqlx_core::query::query;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::{PgConnectOptions, PgConnection, Postgres};
use tracing::{debug, instrument};
use url::Url;

use crate::config::PgClientConfig;
use crate::connection::mask_password;
use crate::error::{PostgresError, Result};
use crate::statement::{Probe, Sql, Statement};

/// Ping / exec / probe against a connection URL.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Opens a connection with the URL's credentials and database.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is unreachable or rejects the login.
    async fn ping(&self, url: &Url) -> Result<()>;

    /// Executes a mutating statement.
    ///
    /// # Errors
    ///
    /// Returns the server's error; callers inspect its SQLSTATE.
    async fn exec(&self, url: &Url, statement: &Statement) -> Result<()>;

    /// Runs an existence probe.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe cannot be executed.
    async fn probe(&self, url: &Url, probe: &Probe) -> Result<bool>;
}

/// Type alias for a shareable database client.
pub type DynDatabaseClient = Arc<dyn DatabaseClient>;

/// sqlx-backed [`DatabaseClient`].
#[derive(Debug, Clone, Default)]
pub struct PgClient {
    config: PgClientConfig,
}

impl PgClient {
    /// Creates a client with the given deadlines.
    #[must_use]
    pub fn new(config: PgClientConfig) -> Self {
        Self { config }
    }

    async fn connect(&self, url: &Url) -> Result<PgConnection> {
        let options = PgConnectOptions::from_str(url.as_str())?;
        tokio::time::timeout(
            self.config.connect_timeout(),
            PgConnection::connect_with(&options),
        )
        .await
        .map_err(|_| PostgresError::timeout("connect"))?
        .map_err(PostgresError::from)
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.config.statement_timeout(), work)
            .await
            .map_err(|_| PostgresError::timeout(operation))?
    }
}

#[async_trait]
impl DatabaseClient for PgClient {
    #[instrument(skip_all, fields(url = %mask_password(url)))]
    async fn ping(&self, url: &Url) -> Result<()> {
        let mut conn = self.connect(url).await?;
        let result = self
            .bounded("ping", async { conn.ping().await.map_err(PostgresError::from) })
            .await;
        close(conn).await;
        result
    }

    #[instrument(skip_all, fields(url = %mask_password(url), operation = statement.operation()))]
    async fn exec(&self, url: &Url, statement: &Statement) -> Result<()> {
        let mut conn = self.connect(url).await?;
        let result = self
            .bounded(statement.operation(), execute(&mut conn, statement.render()))
            .await;
        close(conn).await;
        if result.is_ok() {
            debug!("Statement executed");
        }
        result
    }

    #[instrument(skip_all, fields(url = %mask_password(url)))]
    async fn probe(&self, url: &Url, probe: &Probe) -> Result<bool> {
        let mut conn = self.connect(url).await?;
        let (text, params) = probe.render();
        let result = self
            .bounded("probe", async {
                let mut scalar = query_scalar::<Postgres, bool>(text);
                for param in params {
                    scalar = scalar.bind(param);
                }
                scalar
                    .fetch_one(&mut conn)
                    .await
                    .map_err(PostgresError::from)
            })
            .await;
        close(conn).await;
        result
    }
}

async fn execute(conn: &mut PgConnection, sql: Sql) -> Result<()> {
    let text = match sql {
        Sql::Direct(text) => text,
        Sql::Formatted { query: format, params } => {
            let mut scalar = query_scalar::<Postgres, String>(format);
            for param in params {
                scalar = scalar.bind(param);
            }
            scalar.fetch_one(&mut *conn).await?
        }
    };

    query::<Postgres>(&text).execute(&mut *conn).await?;
    Ok(())
}

async fn close(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        debug!(error = %e, "Failed to close connection cleanly");
    }
}
