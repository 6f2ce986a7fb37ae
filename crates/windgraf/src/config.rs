//! Configuration file parsing and structures.
//!
//! windgraf reads a single TOML file. Every section except the station list is
//! optional and falls back to defaults:
//! - `[logging]`: default level plus per-target overrides
//! - `[api]`: HTTP API bind address (API disabled when absent)
//! - `[http]`: outbound HTTP client settings
//! - `[[integrations.windgraf]]`: one entry per weather station page

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing_subscriber::filter::{LevelFilter, Targets};

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub api: Option<ApiConfig>,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub integrations: IntegrationsConfig,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"windgraf::integrations" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build a target filter from the default level and the overrides
    pub fn targets(&self) -> Targets {
        self.overrides
            .iter()
            .fold(
                Targets::new().with_default(LevelFilter::from(self.level)),
                |targets, (target, level)| targets.with_target(target.clone(), *level),
            )
    }
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8565
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

/// Outbound HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Upper bound for a single page request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Integration configuration container
#[derive(Debug, Default, Deserialize)]
pub struct IntegrationsConfig {
    /// Windgraf weather station pages
    #[serde(default)]
    pub windgraf: Vec<WindgrafConfig>,
}

fn default_scan_interval_secs() -> u64 {
    30
}

/// Lowercase, underscore-separated form of a display name
pub(crate) fn object_id(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// One weather station page
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WindgrafConfig {
    /// Base name for the sensors of this station (e.g. "Garden")
    pub name: String,

    /// Page rendered by the station
    pub url: String,

    /// How often the sensors are asked to update
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
}

impl WindgrafConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            scan_interval_secs: default_scan_interval_secs(),
        }
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();

        for (i, station) in self.integrations.windgraf.iter().enumerate() {
            let field = |name: &str| format!("integrations.windgraf[{}].{}", i, name);

            if station.name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: field("name"),
                    message: "name must not be empty".to_string(),
                });
            }

            if !(station.url.starts_with("http://") || station.url.starts_with("https://")) {
                return Err(ConfigError::Invalid {
                    field: field("url"),
                    message: format!("'{}' is not an http(s) URL", station.url),
                });
            }

            if station.scan_interval_secs == 0 {
                return Err(ConfigError::Invalid {
                    field: field("scan_interval_secs"),
                    message: "scan interval must be at least one second".to_string(),
                });
            }

            // Stations sharing an object id would share entity ids
            if !seen.insert(object_id(&station.name)) {
                return Err(ConfigError::Invalid {
                    field: field("name"),
                    message: format!("station '{}' is configured twice", station.name),
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: String, message: String },
}
