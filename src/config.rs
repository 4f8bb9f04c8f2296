use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

const CONFIG_DIR: &str = "config";
const ENV_PREFIX: &str = "APP";
const FALLBACK_PROFILE: &str = "development";
const FALLBACK_DATABASE_URL: &str = "sqlite://categories.db?mode=rwc";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Engine tuning, read from the `[category_tree]` table.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields, default)]
pub struct CategoryTreeConfig {
    /// How long a mutation waits for the tree write lock before failing
    #[validate(range(min = 1, max = 600000))]
    pub lock_timeout_ms: u64,

    /// Number of `-2`, `-3`, ... suffixes tried before a slug is a conflict
    #[validate(range(min = 1))]
    pub max_slug_attempts: u32,

    /// Deepest allowed `level`; unbounded when unset
    pub max_depth: Option<i32>,
}

impl Default for CategoryTreeConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            max_slug_attempts: 100,
            max_depth: None,
        }
    }
}

impl CategoryTreeConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Process configuration for binaries embedding the category engine
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Profile name: development, staging, production
    #[validate(length(min = 1))]
    pub environment: String,

    #[serde(default = "AppConfig::default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    /// Apply pending migrations when a binary starts
    #[serde(default = "AppConfig::enabled")]
    pub auto_migrate: bool,

    #[serde(default = "AppConfig::default_max_connections")]
    #[validate(range(min = 1))]
    pub db_max_connections: u32,
    #[serde(default = "AppConfig::default_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "AppConfig::default_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "AppConfig::default_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "AppConfig::default_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Buffered category events before `send` waits on the consumer
    #[serde(default = "AppConfig::default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    #[serde(default)]
    #[validate]
    pub category_tree: CategoryTreeConfig,
}

impl AppConfig {
    /// Config for `database_url` in profile `environment`, defaults elsewhere.
    pub fn new(database_url: String, environment: String) -> Self {
        Self {
            database_url,
            environment,
            log_level: Self::default_log_level(),
            log_json: false,
            auto_migrate: true,
            db_max_connections: Self::default_max_connections(),
            db_min_connections: Self::default_min_connections(),
            db_connect_timeout_secs: Self::default_connect_timeout_secs(),
            db_idle_timeout_secs: Self::default_idle_timeout_secs(),
            db_acquire_timeout_secs: Self::default_acquire_timeout_secs(),
            event_channel_capacity: Self::default_event_channel_capacity(),
            category_tree: CategoryTreeConfig::default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn default_log_level() -> String {
        "info".to_string()
    }

    fn enabled() -> bool {
        true
    }

    fn default_max_connections() -> u32 {
        16
    }

    fn default_min_connections() -> u32 {
        2
    }

    fn default_connect_timeout_secs() -> u64 {
        30
    }

    fn default_idle_timeout_secs() -> u64 {
        600
    }

    fn default_acquire_timeout_secs() -> u64 {
        8
    }

    fn default_event_channel_capacity() -> usize {
        1024
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    if LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        return Ok(());
    }
    let mut err = ValidationError::new("log_level");
    err.message = Some(format!("Must be one of: {}", LOG_LEVELS.join(", ")).into());
    Err(err)
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Installs the global `fmt` subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let directives = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("stateset_category_tree={},sea_orm=warn", level));

    let builder = fmt().with_env_filter(EnvFilter::new(directives));
    // A second init (tests, embedding apps) keeps the first subscriber.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Loads [`AppConfig`] from `./config`.
///
/// Later sources override earlier ones:
/// 1. built-in defaults
/// 2. `config/default.toml`
/// 3. `config/{RUN_ENV}.toml` (`APP_ENV` is also accepted)
/// 4. `APP__*` environment variables, `__` separating nested keys
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(CONFIG_DIR)
}

pub fn load_config_from(config_dir: &str) -> Result<AppConfig, AppConfigError> {
    let profile = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| FALLBACK_PROFILE.to_string());

    if !Path::new(config_dir).is_dir() {
        info!(config_dir, "No config directory; using defaults and environment");
    }

    let app_config: AppConfig = Config::builder()
        .set_default("database_url", FALLBACK_DATABASE_URL)?
        .set_default("environment", profile.as_str())?
        .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
        .add_source(File::with_name(&format!("{}/{}", config_dir, profile)).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?
        .try_deserialize()?;

    if let Err(e) = app_config.validate() {
        error!(profile = %profile, errors = ?e, "Rejected configuration");
        return Err(e.into());
    }

    info!(
        profile = %profile,
        environment = %app_config.environment,
        "Configuration loaded"
    );
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_dir_with(default_toml: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("default.toml"), default_toml).unwrap();
        dir
    }

    fn base() -> AppConfig {
        AppConfig::new("sqlite::memory:".into(), "development".into())
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = base();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.category_tree.lock_timeout(), Duration::from_millis(5_000));
        assert_eq!(cfg.category_tree.max_slug_attempts, 100);
        assert!(cfg.category_tree.max_depth.is_none());
        assert!(!cfg.is_production());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut cfg = base();
        cfg.log_level = "loud".into();
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("log_level"));

        cfg.log_level = "WARN".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_channel_capacity_and_lock_timeout() {
        let mut cfg = base();
        cfg.event_channel_capacity = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base();
        cfg.category_tree.lock_timeout_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn loads_nested_tree_settings_from_file() {
        let dir = config_dir_with(
            r#"
            database_url = "postgres://localhost/catalog"
            environment = "staging"
            log_level = "debug"

            [category_tree]
            lock_timeout_ms = 250
            max_depth = 6
            "#,
        );

        let cfg = load_config_from(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.database_url, "postgres://localhost/catalog");
        assert_eq!(cfg.log_level(), "debug");
        assert_eq!(cfg.category_tree.lock_timeout_ms, 250);
        // Unset keys in the table keep their defaults.
        assert_eq!(cfg.category_tree.max_slug_attempts, 100);
        assert_eq!(cfg.category_tree.max_depth, Some(6));
    }

    #[test]
    fn file_with_invalid_values_fails_validation() {
        let dir = config_dir_with(
            r#"
            database_url = "postgres://localhost/catalog"
            environment = "staging"
            log_level = "chatty"
            "#,
        );

        let result = load_config_from(dir.path().to_str().unwrap());
        assert!(matches!(result, Err(AppConfigError::Validation(_))));
    }
}
