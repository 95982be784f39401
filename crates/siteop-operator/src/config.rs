use serde::{Deserialize, Serialize};
use siteop_db_postgres::{PgClientConfig, connection};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OperatorConfig {
    #[serde(default)]
    pub operator: ControllerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl OperatorConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Controller validations
        if self.operator.concurrency == 0 {
            return Err("operator.concurrency must be > 0".into());
        }
        if self.operator.error_backoff_secs == 0 {
            return Err("operator.error_backoff_secs must be > 0".into());
        }
        if self.operator.resync_secs == 0 {
            return Err("operator.resync_secs must be > 0".into());
        }
        if self.operator.reconcile_timeout_secs == 0 {
            return Err("operator.reconcile_timeout_secs must be > 0".into());
        }
        if self
            .operator
            .watch_namespace
            .as_deref()
            .is_some_and(str::is_empty)
        {
            return Err("operator.watch_namespace must not be empty when set".into());
        }
        // Database validations
        let main = self.main_url()?;
        if connection::password(&main)
            .map_err(|e| format!("database.main_url: {e}"))?
            .is_none()
        {
            return Err("database.main_url must carry a password".into());
        }
        connection::role_name(&main).map_err(|e| format!("database.main_url: {e}"))?;
        connection::database_name(&main).map_err(|e| format!("database.main_url: {e}"))?;
        if self.database.connect_timeout_ms == 0 || self.database.statement_timeout_ms == 0 {
            return Err("database timeouts must be > 0".into());
        }
        if let Some(mode) = self.database.ssl_mode.as_deref() {
            let valid_modes = ["disable", "allow", "prefer", "require", "verify-ca", "verify-full"];
            if !valid_modes.contains(&mode) {
                return Err(format!("database.ssl_mode must be one of {valid_modes:?}"));
            }
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    /// The administrative database URL.
    pub fn main_url(&self) -> Result<Url, String> {
        let raw = self
            .database
            .main_url
            .as_deref()
            .ok_or_else(|| "database.main_url is required".to_string())?;
        connection::parse_url(raw).map_err(|e| format!("database.main_url: {e}"))
    }

    pub fn client_config(&self) -> PgClientConfig {
        PgClientConfig::default()
            .with_connect_timeout_ms(self.database.connect_timeout_ms)
            .with_statement_timeout_ms(self.database.statement_timeout_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.operator.error_backoff_secs)
    }
    pub fn resync(&self) -> Duration {
        Duration::from_secs(self.operator.resync_secs)
    }
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.operator.reconcile_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Namespace to watch; all namespaces when unset.
    #[serde(default)]
    pub watch_namespace: Option<String>,
    /// Reconciles running at once per controller.
    #[serde(default = "default_concurrency")]
    pub concurrency: u16,
    /// Requeue delay after a transient failure.
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
    /// Requeue delay after a configuration failure.
    #[serde(default = "default_resync_secs")]
    pub resync_secs: u64,
    #[serde(default = "default_reconcile_timeout_secs")]
    pub reconcile_timeout_secs: u64,
}

fn default_concurrency() -> u16 {
    4
}
fn default_error_backoff_secs() -> u64 {
    15
}
fn default_resync_secs() -> u64 {
    300
}
fn default_reconcile_timeout_secs() -> u64 {
    120
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            concurrency: default_concurrency(),
            error_backoff_secs: default_error_backoff_secs(),
            resync_secs: default_resync_secs(),
            reconcile_timeout_secs: default_reconcile_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Administrative ("main") connection URL, including its password.
    #[serde(default)]
    pub main_url: Option<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
    /// Grant each subject role to the administrative role before changing
    /// schema ownership. Some managed providers require it; superusers don't.
    #[serde(default = "default_grant_subject_to_admin")]
    pub grant_subject_to_admin: bool,
    /// `sslmode` for subject URLs built from a Site.
    #[serde(default)]
    pub ssl_mode: Option<String>,
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_statement_timeout_ms() -> u64 {
    30_000
}
fn default_grant_subject_to_admin() -> bool {
    true
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            main_url: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            statement_timeout_ms: default_statement_timeout_ms(),
            grant_subject_to_admin: default_grant_subject_to_admin(),
            ssl_mode: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::OperatorConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file, relative to the working directory.
    pub const DEFAULT_CONFIG_PATH: &str = "siteop.toml";

    pub fn load_config(path: Option<&str>) -> Result<OperatorConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., SITEOP__DATABASE__MAIN_URL=postgres://...
        builder = builder.add_source(
            Environment::with_prefix("SITEOP")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: OperatorConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        // Validate
        merged.validate()?;
        Ok(merged)
    }
}
