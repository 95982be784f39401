//! Error types for the PostgreSQL administration client.

use sqlx_core::error::Error as SqlxError;

use crate::identifier::IdentifierError;

/// PostgreSQL error code for an undefined schema (3F000).
pub const PG_INVALID_SCHEMA_NAME: &str = "3F000";

/// PostgreSQL error code for an unknown database (3D000).
pub const PG_INVALID_CATALOG_NAME: &str = "3D000";

/// PostgreSQL error code for a failed password authentication (28P01).
pub const PG_INVALID_PASSWORD: &str = "28P01";

/// PostgreSQL error code for a role that may not log in or does not exist (28000).
pub const PG_INVALID_AUTHORIZATION: &str = "28000";

/// Errors raised while talking to a PostgreSQL server.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// A role, database or schema name failed validation.
    #[error("Invalid identifier: {0}")]
    Identifier(#[from] IdentifierError),

    /// Malformed or inconsistent connection settings.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Driver level failure (connect, I/O, protocol, server error).
    #[error("Database error: {0}")]
    Sqlx(#[from] SqlxError),

    /// An error reported by the server with its SQLSTATE.
    #[error("Server error {code}: {message}")]
    Server { code: String, message: String },

    /// The call did not finish before its deadline.
    #[error("Timed out during {operation}")]
    Timeout { operation: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a new server error carrying a SQLSTATE code.
    #[must_use]
    pub fn server(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Server {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a new timeout error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// SQLSTATE of the failure, if the server reported one.
    #[must_use]
    pub fn sqlstate(&self) -> Option<String> {
        match self {
            Self::Sqlx(SqlxError::Database(db_err)) => db_err.code().map(|c| c.into_owned()),
            Self::Server { code, .. } => Some(code.clone()),
            _ => None,
        }
    }

    /// True if the error is "schema does not exist".
    #[must_use]
    pub fn is_invalid_schema_name(&self) -> bool {
        self.sqlstate().as_deref() == Some(PG_INVALID_SCHEMA_NAME)
    }

    /// True if the server rejected the credentials or the target database.
    #[must_use]
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self.sqlstate().as_deref(),
            Some(PG_INVALID_PASSWORD | PG_INVALID_AUTHORIZATION | PG_INVALID_CATALOG_NAME)
        )
    }

    /// Configuration problems recur until the declared spec changes.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Identifier(_) | Self::Config { .. })
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;
