//! Engine configuration (`.dyninvoke.toml`)

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::{self, LogConfig, LogFormat, LogOutput};

/// File name searched for by [`Config::discover`]
pub const CONFIG_FILE: &str = ".dyninvoke.toml";

static ACTIVE: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::default()));

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub invoke: InvokeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormatName,

    /// Log file path; console output when absent
    #[serde(default)]
    pub file: Option<String>,

    #[serde(default = "default_false")]
    pub spans: bool,

    /// Extra filter directives
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatName {
    Pretty,
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeConfig {
    /// Check every argument before any native work starts
    ///
    /// Debugging aid only. When off, conversion errors surface from the frame
    /// builder instead, still before the native call.
    #[serde(default = "default_true")]
    pub type_check: bool,

    /// Keep compiled call plans in the process-wide cache
    #[serde(default = "default_true")]
    pub cache_plans: bool,

    /// Emit a debug event for every native call
    #[serde(default = "default_false")]
    pub log_calls: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormatName::default(),
            file: None,
            spans: false,
            filter: None,
        }
    }
}

impl Default for InvokeConfig {
    fn default() -> Self {
        Self {
            type_check: true,
            cache_plans: true,
            log_calls: false,
        }
    }
}

fn default_true() -> bool { true }
fn default_false() -> bool { false }
fn default_level() -> String { "info".to_string() }

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Find and load configuration file from current directory or parents
    pub fn discover() -> Self {
        std::env::current_dir()
            .ok()
            .and_then(|dir| Self::discover_from(&dir))
            .unwrap_or_default()
    }

    /// Walk up from `start` looking for a loadable config file
    pub fn discover_from(start: &Path) -> Option<Self> {
        start.ancestors().find_map(|dir| {
            let path = dir.join(CONFIG_FILE);
            if !path.exists() {
                return None;
            }
            match Self::load(&path) {
                Ok(config) => Some(config),
                Err(err) => {
                    logging::warn!(path = %path.display(), error = %err, "Ignoring config file");
                    None
                }
            }
        })
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate config"))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;

        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Logging setup described by the `[logging]` table
    pub fn log_config(&self) -> LogConfig {
        let mut config = LogConfig::new()
            .with_level(logging::parse_level(&self.logging.level).unwrap_or(tracing::Level::INFO))
            .with_format(match self.logging.format {
                LogFormatName::Pretty => LogFormat::Pretty,
                LogFormatName::Compact => LogFormat::Compact,
                LogFormatName::Json => LogFormat::Json,
            })
            .with_span_events(self.logging.spans);
        if let Some(file) = &self.logging.file {
            config = config.with_output(LogOutput::file(file));
        }
        if let Some(filter) = &self.logging.filter {
            config = config.with_filter(filter.clone());
        }
        config
    }
}

/// Snapshot of the active configuration
pub fn active() -> Config {
    ACTIVE.read().clone()
}

/// Invocation settings of the active configuration
pub(crate) fn invoke_settings() -> InvokeConfig {
    ACTIVE.read().invoke.clone()
}

/// Replace the active configuration
pub fn install(config: Config) {
    *ACTIVE.write() = config;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.invoke.type_check);
        assert!(config.invoke.cache_plans);
        assert!(!config.invoke.log_calls);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[logging]
level = "debug"
format = "json"

[invoke]
log_calls = true
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.logging.format, LogFormatName::Json);
        assert!(config.invoke.log_calls);
        assert!(config.invoke.type_check);

        let log = config.log_config();
        assert_eq!(log.level, tracing::Level::DEBUG);
        assert_eq!(log.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(Config::parse("[invoke]\ntype_check = 3"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_save_and_discover() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();

        let mut config = Config::default();
        config.invoke.cache_plans = false;
        config.save(&dir.path().join(CONFIG_FILE)).unwrap();

        let found = Config::discover_from(&nested).unwrap();
        assert_eq!(found, config);
    }

    #[test]
    fn test_generate_default_roundtrips() {
        let content = Config::generate_default();
        assert_eq!(Config::parse(&content).unwrap(), Config::default());
    }
}
