use siteop_core::ClusterError;
use siteop_db_postgres::{IdentifierError, PostgresError};
use thiserror::Error;

/// Errors surfaced by the operator's reconcilers.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Database error: {0}")]
    Database(#[from] PostgresError),

    #[error("Invalid identifier: {0}")]
    Identifier(#[from] IdentifierError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Secret {namespace}/{name}: {message}")]
    Secret {
        namespace: String,
        name: String,
        message: String,
    },

    #[error("Database {database} still rejects the declared credentials: {source}")]
    Verification {
        database: String,
        #[source]
        source: PostgresError,
    },
}

impl ReconcileError {
    /// Create a new Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new Secret error
    pub fn secret(
        namespace: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Secret {
            namespace: namespace.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Get error category for logging and requeue decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Cluster(ClusterError::Invalid { .. } | ClusterError::Serialization(_)) => {
                ErrorCategory::Configuration
            }
            Self::Cluster(_) => ErrorCategory::Transient,
            Self::Database(err) if err.is_configuration() => ErrorCategory::Configuration,
            Self::Database(_) => ErrorCategory::Transient,
            Self::Identifier(_) | Self::Config(_) => ErrorCategory::Configuration,
            Self::Secret { .. } | Self::Verification { .. } => ErrorCategory::Transient,
        }
    }

    /// True if the error will recur until the declared object changes.
    pub fn is_configuration(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }
}

/// Error categories for requeue policy and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed or inconsistent declared state.
    Configuration,
    /// Unreachable servers, timeouts, write conflicts.
    Transient,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Transient => write!(f, "transient"),
        }
    }
}

/// Convenience result type for reconcile operations
pub type Result<T> = std::result::Result<T, ReconcileError>;
