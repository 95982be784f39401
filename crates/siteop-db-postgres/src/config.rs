//! Configuration types for the PostgreSQL administration client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Deadlines applied to every call made by [`PgClient`](crate::PgClient).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PgClientConfig {
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Deadline for a single statement or probe, in milliseconds.
    pub statement_timeout_ms: u64,
}

impl Default for PgClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            statement_timeout_ms: 30_000,
        }
    }
}

impl PgClientConfig {
    /// Sets the connection timeout.
    #[must_use]
    pub fn with_connect_timeout_ms(mut self, timeout: u64) -> Self {
        self.connect_timeout_ms = timeout;
        self
    }

    /// Sets the statement timeout.
    #[must_use]
    pub fn with_statement_timeout_ms(mut self, timeout: u64) -> Self {
        self.statement_timeout_ms = timeout;
        self
    }

    /// Connection timeout as a `Duration`.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Statement timeout as a `Duration`.
    #[must_use]
    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PgClientConfig::default();
        assert_eq!(config.connect_timeout_ms, 5000);
        assert_eq!(config.statement_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_config_builder() {
        let config = PgClientConfig::default()
            .with_connect_timeout_ms(1000)
            .with_statement_timeout_ms(2000);
        assert_eq!(config.connect_timeout(), Duration::from_secs(1));
        assert_eq!(config.statement_timeout(), Duration::from_secs(2));
    }
}
