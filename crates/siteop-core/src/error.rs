//! Error types for cluster interaction.

use std::fmt;

/// Errors returned by a [`ClusterClient`](crate::ClusterClient) and the
/// convergence helpers built on top of it.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The addressed object does not exist.
    #[error("Object not found: {key}")]
    NotFound {
        /// Display form of the object key.
        key: String,
    },

    /// The object changed since it was read (resource version mismatch).
    #[error("Conflict writing {key}: {message}")]
    Conflict {
        /// Display form of the object key.
        key: String,
        /// Server supplied reason.
        message: String,
    },

    /// Attempted to create an object that already exists.
    #[error("Object already exists: {key}")]
    AlreadyExists {
        /// Display form of the object key.
        key: String,
    },

    /// The object was rejected as malformed.
    #[error("Invalid object: {message}")]
    Invalid {
        /// Description of the problem.
        message: String,
    },

    /// Conversion between typed resources and managed objects failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A call did not finish before its deadline.
    #[error("Timed out: {operation}")]
    Timeout {
        /// Name of the operation that timed out.
        operation: String,
    },

    /// Any other API server failure.
    #[error("Cluster API error: {message}")]
    Api {
        /// Description of the failure.
        message: String,
    },
}

impl ClusterError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(key: impl fmt::Display) -> Self {
        Self::NotFound {
            key: key.to_string(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(key: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::Conflict {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(key: impl fmt::Display) -> Self {
        Self::AlreadyExists {
            key: key.to_string(),
        }
    }

    /// Creates a new `Invalid` error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Creates a new `Api` error.
    #[must_use]
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Returns true if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns true if this is an `AlreadyExists` error.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Result type alias for cluster operations.
pub type Result<T> = std::result::Result<T, ClusterError>;
