//! Configuration management for the pgcomply runner

use pgcomply_core::{Error, Result};
use pgcomply_probe::PgTarget;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Target database connection
    #[serde(default)]
    pub target: PgTarget,

    /// Runner limits and timeouts
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("failed to parse config: {}", e)))
    }

    /// Merge with environment variables (PGCOMPLY_ prefix). The target
    /// password only ever arrives this way or via the config file, never
    /// on the command line.
    pub fn merge_env(mut self) -> Self {
        if let Ok(val) = std::env::var("PGCOMPLY_TARGET_HOST") {
            self.target.host = val;
        }
        if let Ok(val) = std::env::var("PGCOMPLY_TARGET_PORT") {
            if let Ok(port) = val.parse() {
                self.target.port = port;
            }
        }
        if let Ok(val) = std::env::var("PGCOMPLY_TARGET_DBNAME") {
            self.target.dbname = val;
        }
        if let Ok(val) = std::env::var("PGCOMPLY_TARGET_USER") {
            self.target.user = val;
        }
        if let Ok(val) = std::env::var("PGCOMPLY_TARGET_PASSWORD") {
            self.target.password = Some(val);
        }

        if let Ok(val) = std::env::var("PGCOMPLY_MAX_SESSIONS") {
            if let Ok(n) = val.parse() {
                self.runner.max_concurrent_sessions = n;
            }
        }

        if let Ok(val) = std::env::var("PGCOMPLY_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("PGCOMPLY_LOG_FORMAT") {
            self.logging.format = val;
        }

        self
    }
}

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Maximum concurrently running controls (one session each)
    #[serde(default = "default_max_sessions")]
    pub max_concurrent_sessions: usize,

    /// Default timeout for exec probes in seconds
    #[serde(default = "default_exec_timeout")]
    pub exec_timeout_secs: u64,

    /// Optional run deadline in seconds
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

fn default_max_sessions() -> usize {
    4
}

fn default_exec_timeout() -> u64 {
    30
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: default_max_sessions(),
            exec_timeout_secs: default_exec_timeout(),
            deadline_secs: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_log_format() -> String {
    String::from("pretty")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [target]
            host = "db01.example.com"
            port = 5433
            dbname = "stig"
            user = "auditor"

            [runner]
            max_concurrent_sessions = 8
            deadline_secs = 600

            [logging]
            level = "debug"
            format = "json"
        "#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.target.host, "db01.example.com");
        assert_eq!(config.target.port, 5433);
        assert_eq!(config.runner.max_concurrent_sessions, 8);
        assert_eq!(config.runner.deadline_secs, Some(600));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.target.host, "localhost");
        assert_eq!(config.target.port, 5432);
        assert_eq!(config.runner.max_concurrent_sessions, 4);
        assert_eq!(config.runner.exec_timeout_secs, 30);
        assert!(config.runner.deadline_secs.is_none());
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_bad_toml_is_configuration_error() {
        let err = Config::from_toml("[target").unwrap_err();
        assert!(err.is_fatal());
    }
}
