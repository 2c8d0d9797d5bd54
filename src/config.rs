//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::gateway::DocumentRef;
use crate::widgets::{DEFAULT_EXTENDED_LIMIT, DEFAULT_LIMIT};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feeds: FeedsConfig,

    #[serde(default)]
    pub dashboard: DashboardConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the widgets read their data
#[derive(Debug, Clone, Deserialize)]
pub struct FeedsConfig {
    /// Analytics document as `collection/id`
    #[serde(default = "default_stats_document")]
    pub stats_document: String,

    #[serde(default = "default_activity_collection")]
    pub activity_collection: String,

    #[serde(default = "default_activity_limit")]
    pub activity_limit: usize,

    #[serde(default = "default_activity_extended_limit")]
    pub activity_extended_limit: usize,
}

fn default_stats_document() -> String {
    "analytics/stats".to_string()
}

fn default_activity_collection() -> String {
    "activity_logs".to_string()
}

fn default_activity_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_activity_extended_limit() -> usize {
    DEFAULT_EXTENDED_LIMIT
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            stats_document: default_stats_document(),
            activity_collection: default_activity_collection(),
            activity_limit: default_activity_limit(),
            activity_extended_limit: default_activity_extended_limit(),
        }
    }
}

impl FeedsConfig {
    /// Parsed analytics document reference
    pub fn stats_document_ref(&self) -> Result<DocumentRef, ConfigError> {
        self.stats_document
            .parse()
            .map_err(|e: crate::gateway::GatewayError| ConfigError::Invalid {
                field: "feeds.stats_document".to_string(),
                error: e.to_string(),
            })
    }

    /// Reject values no feed could run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stats_document_ref()?;

        if self.activity_collection.is_empty() {
            return Err(ConfigError::Invalid {
                field: "feeds.activity_collection".to_string(),
                error: "must not be empty".to_string(),
            });
        }
        for (field, limit) in [
            ("feeds.activity_limit", self.activity_limit),
            ("feeds.activity_extended_limit", self.activity_extended_limit),
        ] {
            if limit == 0 {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    error: "must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Dashboard shell behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Start the activity widget in extended mode
    #[serde(default)]
    pub extended_activity: bool,

    /// Tear down all feeds when the session ends
    #[serde(default = "default_release_on_sign_out")]
    pub release_on_sign_out: bool,
}

fn default_release_on_sign_out() -> bool {
    true
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            extended_activity: false,
            release_on_sign_out: default_release_on_sign_out(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.feeds.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.feeds.validate()?;
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        // Try default config locations
        let config_paths = [
            dirs::config_dir().map(|p| p.join("dashsync").join("config.toml")),
            Some(PathBuf::from("/etc/dashsync/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Feed overrides
        if let Ok(document) = std::env::var("DASHSYNC_STATS_DOCUMENT") {
            self.feeds.stats_document = document;
        }
        if let Ok(limit) = std::env::var("DASHSYNC_ACTIVITY_LIMIT") {
            if let Ok(n) = limit.parse() {
                self.feeds.activity_limit = n;
            }
        }
        if let Ok(limit) = std::env::var("DASHSYNC_ACTIVITY_EXTENDED_LIMIT") {
            if let Ok(n) = limit.parse() {
                self.feeds.activity_extended_limit = n;
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("DASHSYNC_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("DASHSYNC_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid value for {field}: {error}")]
    Invalid { field: String, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Dashsync Configuration
#
# Environment variables override these settings:
# - DASHSYNC_STATS_DOCUMENT
# - DASHSYNC_ACTIVITY_LIMIT
# - DASHSYNC_ACTIVITY_EXTENDED_LIMIT
# - DASHSYNC_LOG_LEVEL
# - DASHSYNC_LOG_FORMAT

[feeds]
# Analytics document read by the stats cards (collection/id)
stats_document = "analytics/stats"

# Collection holding activity log entries
activity_collection = "activity_logs"

# Entries shown by the normal and extended activity feeds
activity_limit = 5
activity_extended_limit = 10

[dashboard]
# Start the activity widget in extended mode
extended_activity = false

# Tear down all live feeds when the user signs out
release_on_sign_out = true

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
