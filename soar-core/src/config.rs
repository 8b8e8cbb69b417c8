use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::error::RetryConfig;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SoarConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_pool_min")]
    pub pool_min_connections: u32,

    #[serde(default = "default_pool_max")]
    pub pool_max_connections: u32,

    #[serde(default = "default_acquire_timeout")]
    pub pool_acquire_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub pool_idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json_format: bool,
}

/// Tuning for the cascade worker that advances executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Attempts per cascade task before it is dead-lettered (transient errors only).
    #[serde(default = "default_cascade_attempts")]
    pub cascade_max_attempts: u32,

    #[serde(default = "default_cascade_initial_delay")]
    pub cascade_initial_delay_ms: u64,

    #[serde(default = "default_cascade_max_delay")]
    pub cascade_max_delay_ms: u64,

    /// Dead letters kept in memory; oldest are evicted first.
    #[serde(default = "default_dead_letter_capacity")]
    pub dead_letter_capacity: usize,
}

fn default_database_url() -> String {
    "postgres://localhost/soar_dev".to_string()
}

fn default_pool_min() -> u32 {
    1
}

fn default_pool_max() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cascade_attempts() -> u32 {
    5
}

fn default_cascade_initial_delay() -> u64 {
    200
}

fn default_cascade_max_delay() -> u64 {
    10_000
}

fn default_dead_letter_capacity() -> usize {
    1000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            pool_min_connections: default_pool_min(),
            pool_max_connections: default_pool_max(),
            pool_acquire_timeout_secs: default_acquire_timeout(),
            pool_idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cascade_max_attempts: default_cascade_attempts(),
            cascade_initial_delay_ms: default_cascade_initial_delay(),
            cascade_max_delay_ms: default_cascade_max_delay(),
            dead_letter_capacity: default_dead_letter_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.cascade_max_attempts,
            initial_delay: Duration::from_millis(self.cascade_initial_delay_ms),
            max_delay: Duration::from_millis(self.cascade_max_delay_ms),
            backoff_multiplier: 2.0,
        }
    }
}

impl SoarConfig {
    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_from_paths(get_config_paths())
    }

    pub fn load_from_paths(paths: Vec<PathBuf>) -> Result<Self, ConfigLoadError> {
        load_dotenv_files();

        let mut builder = ConfigBuilder::builder();

        for path in paths {
            if path.exists() {
                builder = builder.add_source(File::from(path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("SOAR")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;

        let mut soar_config: SoarConfig = config.try_deserialize()?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            soar_config.database.url = url;
        } else if let Ok(url) = std::env::var("SOAR_DATABASE_URL") {
            soar_config.database.url = url;
        }

        if let Ok(level) = std::env::var("SOAR_LOG_LEVEL") {
            soar_config.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            soar_config.logging.level = level;
        }

        soar_config.validate()?;

        Ok(soar_config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.database.url.is_empty() {
            return Err(ConfigLoadError::MissingRequired("database.url".to_string()));
        }

        if !self.database.url.starts_with("postgres://")
            && !self.database.url.starts_with("postgresql://")
        {
            return Err(ConfigLoadError::InvalidValue {
                key: "database.url".to_string(),
                message:
                    "Must be a valid PostgreSQL URL starting with postgres:// or postgresql://"
                        .to_string(),
            });
        }

        if self.database.pool_min_connections > self.database.pool_max_connections {
            return Err(ConfigLoadError::InvalidValue {
                key: "database.pool_min_connections".to_string(),
                message: "Cannot be greater than pool_max_connections".to_string(),
            });
        }

        if self.engine.cascade_max_attempts == 0 {
            return Err(ConfigLoadError::InvalidValue {
                key: "engine.cascade_max_attempts".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level_lower = self.logging.level.to_lowercase();
        if !valid_levels.contains(&level_lower.as_str()) && !level_lower.contains('=') {
            return Err(ConfigLoadError::InvalidValue {
                key: "logging.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Must be one of: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        Ok(())
    }

    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    pub fn log_level(&self) -> &str {
        &self.logging.level
    }
}

fn get_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join("config").join("default.toml"));
        paths.push(cwd.join("config").join("local.toml"));
        paths.push(cwd.join("soar.toml"));
    }

    if let Some(config_dir) = get_config_dir() {
        paths.push(config_dir.join("config.toml"));
    }

    paths
}

fn load_dotenv_files() {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".env"));
        paths.push(cwd.join(".env.local"));
    }

    if let Some(config_dir) = get_config_dir() {
        paths.push(config_dir.join(".env"));
    }

    for path in paths {
        if path.exists() {
            let _ = dotenvy::from_path(&path);
        }
    }
}

pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("soar"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SoarConfig::default();

        assert_eq!(config.database.url, "postgres://localhost/soar_dev");
        assert_eq!(config.database.pool_min_connections, 1);
        assert_eq!(config.database.pool_max_connections, 10);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert_eq!(config.engine.cascade_max_attempts, 5);
        assert_eq!(config.engine.dead_letter_capacity, 1000);
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(SoarConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_database_url() {
        let mut config = SoarConfig::default();
        config.database.url = "mysql://localhost/test".to_string();
        assert!(config.validate().is_err());

        config.database.url = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigLoadError::MissingRequired(_))
        ));
    }

    #[test]
    fn test_validation_invalid_pool_config() {
        let mut config = SoarConfig::default();
        config.database.pool_min_connections = 20;
        config.database.pool_max_connections = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_cascade_attempts() {
        let mut config = SoarConfig::default();
        config.engine.cascade_max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_log_levels() {
        let mut config = SoarConfig::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "soar_core=debug,sqlx=warn".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_config_from_engine_config() {
        let engine = EngineConfig {
            cascade_max_attempts: 2,
            cascade_initial_delay_ms: 50,
            cascade_max_delay_ms: 75,
            dead_letter_capacity: 10,
        };
        let retry = engine.retry_config();

        assert_eq!(retry.max_attempts, 2);
        assert_eq!(retry.delay_for_attempt(0), Duration::from_millis(50));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(75));
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soar.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[engine]\ncascade_max_attempts = 7\ndead_letter_capacity = 42\n\n[logging]\njson_format = true"
        )
        .unwrap();

        let config = SoarConfig::load_from_paths(vec![path]).unwrap();

        assert_eq!(config.engine.cascade_max_attempts, 7);
        assert_eq!(config.engine.dead_letter_capacity, 42);
        assert!(config.logging.json_format);
        assert_eq!(config.database.pool_max_connections, 10);
    }
}
