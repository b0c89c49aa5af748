//! Configuration loading.
//!
//! Loads `./stockroom.toml` (or `$STOCKROOM_CONFIG`). Environment variables
//! override file values; file values override defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use stockroom_core::StoreId;
use stockroom_observability::LogFormat;

pub const CONFIG_PATH_VAR: &str = "STOCKROOM_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "stockroom.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StockroomConfig {
    pub storage: StorageConfig,
    pub reports: ReportsConfig,
    pub operator: OperatorConfig,
    pub logging: LoggingConfig,
    /// Store used when a command names none.
    pub default_store: Option<StoreId>,
}

impl StockroomConfig {
    /// Load with precedence env vars > TOML file > defaults. A missing file
    /// yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path_with(|key| std::env::var(key).ok());
        Self::load_with(&path, |key| std::env::var(key).ok())
    }

    /// Load from an explicit path with a custom env resolver.
    pub fn load_with(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_overrides(env);
        Ok(config)
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::debug!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// `$STOCKROOM_CONFIG`, else `./stockroom.toml`.
    pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env(CONFIG_PATH_VAR)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Apply environment variable overrides (env > config > defaults).
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("STOCKROOM_DATA_FILE") {
            self.storage.data_file = PathBuf::from(v);
        }
        if let Some(v) = env("STOCKROOM_REPORTS_DIR") {
            self.reports.dir = PathBuf::from(v);
        }
        if let Some(v) = env("STOCKROOM_OPERATOR") {
            if v.trim().is_empty() {
                tracing::warn!(var = "STOCKROOM_OPERATOR", "ignoring blank env override");
            } else {
                self.operator.name = v.trim().to_string();
            }
        }
        if let Some(v) = env("STOCKROOM_LOG") {
            if tracing_level_is_valid(&v) {
                self.logging.level = v;
            } else {
                tracing::warn!(var = "STOCKROOM_LOG", value = %v, "ignoring invalid env override");
            }
        }
        if let Some(v) = env("STOCKROOM_LOG_FORMAT") {
            match v.parse::<LogFormat>() {
                Ok(f) => self.logging.format = f,
                Err(_) => tracing::warn!(var = "STOCKROOM_LOG_FORMAT", value = %v, "ignoring invalid env override"),
            }
        }
        if let Some(v) = env("STOCKROOM_STORE") {
            match v.parse::<StoreId>() {
                Ok(id) => self.default_store = Some(id),
                Err(_) => tracing::warn!(var = "STOCKROOM_STORE", value = %v, "ignoring invalid env override"),
            }
        }
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }
}

fn tracing_level_is_valid(level: &str) -> bool {
    matches!(
        level.trim().to_ascii_lowercase().as_str(),
        "off" | "error" | "warn" | "info" | "debug" | "trace"
    )
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON event log.
    pub data_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
        }
    }
}

fn default_data_file() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("stockroom").join("stockroom.json"))
        .unwrap_or_else(|| PathBuf::from("stockroom.json"))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    pub dir: PathBuf,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("reports"),
        }
    }
}

/// Name recorded as the actor of movements and orders.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    pub name: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            name: "operator".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
