//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable overriding `log_level`.
const LOG_LEVEL_ENV: &str = "DESKVAULT_LOG_LEVEL";

/// Top-level configuration, stored as `<base>/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Database controller tuning.
    #[serde(default)]
    pub database: DatabaseSettings,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Controller tuning knobs. Durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub health_check_interval_ms: u64,
    /// Lifetime ceiling on worker restarts.
    pub max_restarts: u32,
    pub restart_base_delay_ms: u64,
    pub restart_max_delay_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub bulk_read_timeout_ms: u64,
    pub schema_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub termination_attempts: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            health_check_interval_ms: 30_000,
            max_restarts: 3,
            restart_base_delay_ms: 1_000,
            restart_max_delay_ms: 10_000,
            read_timeout_ms: 15_000,
            write_timeout_ms: 30_000,
            bulk_read_timeout_ms: 45_000,
            schema_timeout_ms: 60_000,
            max_retries: 5,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 2_000,
            termination_attempts: 3,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            database: DatabaseSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from `<base>/config.json`, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to `<base>/config.json`.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var(LOG_LEVEL_ENV) {
            if !log_level.trim().is_empty() {
                self.log_level = log_level.trim().to_string();
            }
        }
    }

    fn validate(&self) -> CoreResult<()> {
        let db = &self.database;
        let timeouts = [
            ("read_timeout_ms", db.read_timeout_ms),
            ("write_timeout_ms", db.write_timeout_ms),
            ("bulk_read_timeout_ms", db.bulk_read_timeout_ms),
            ("schema_timeout_ms", db.schema_timeout_ms),
            ("health_check_interval_ms", db.health_check_interval_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(CoreError::Config(format!("database.{name} must be positive")));
            }
        }
        if db.restart_base_delay_ms > db.restart_max_delay_ms {
            return Err(CoreError::Config(
                "database.restart_base_delay_ms exceeds restart_max_delay_ms".to_string(),
            ));
        }
        if db.retry_base_delay_ms > db.retry_max_delay_ms {
            return Err(CoreError::Config(
                "database.retry_base_delay_ms exceeds retry_max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}
