use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const CONFIG_DIR: &str = "config";

/// Engine configuration.
///
/// Loaded from an optional `config/engine.toml` file with environment
/// variables layered on top (`WAREHOUSE__DATABASE_URL` and friends). The
/// embedding service typically builds one of these from its own settings.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Database connection URL (postgres:// or sqlite://).
    #[validate(length(min = 1))]
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    #[validate(range(min = 1))]
    pub db_max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub db_min_connections: u32,

    /// Create the engine tables on connect if they do not exist. Intended for
    /// SQLite and test setups; production deployments run their own
    /// migrations.
    #[serde(default)]
    pub auto_schema: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_min_connections() -> u32 {
    DEFAULT_MIN_CONNECTIONS
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl EngineConfig {
    /// Minimal configuration pointing at a single database.
    pub fn for_database(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            db_max_connections: DEFAULT_MAX_CONNECTIONS,
            db_min_connections: DEFAULT_MIN_CONNECTIONS,
            auto_schema: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    /// Loads configuration from `config/engine.toml` (if present) and the
    /// `WAREHOUSE__*` environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_file = Path::new(CONFIG_DIR).join("engine");
        builder = builder.add_source(File::from(config_file).required(false));
        builder = builder.add_source(Environment::with_prefix("WAREHOUSE").separator("__"));

        let cfg: EngineConfig = builder.build()?.try_deserialize()?;
        cfg.validate()
            .map_err(|e| ConfigError::Message(format!("invalid engine configuration: {e}")))?;

        info!(
            max_connections = cfg.db_max_connections,
            auto_schema = cfg.auto_schema,
            "engine configuration loaded"
        );
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_database_uses_defaults() {
        let cfg = EngineConfig::for_database("sqlite::memory:");
        assert_eq!(cfg.db_max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(cfg.db_min_connections, DEFAULT_MIN_CONNECTIONS);
        assert!(!cfg.auto_schema);
        assert_eq!(cfg.log_level, "info");
    }
}
