//! Tracing subscriber installation.
//!
//! The filter is read from `LOADFLOW_LOG` first, then `RUST_LOG`, then the
//! configured level.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Environment variable consulted first for the log filter.
pub const LOG_ENV_VAR: &str = "LOADFLOW_LOG";

/// Log level.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Very verbose.
    Trace,
    /// Per-batch flush details.
    Debug,
    /// Task lifecycle and end-of-stream (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// The level as a filter directive.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable console output (default).
    #[default]
    Console,
    /// JSON structured logging.
    Json,
}

/// Log output destination.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Write to stdout (default).
    #[default]
    Stdout,
    /// Write to stderr.
    Stderr,
}

/// Logging configuration.
///
/// ```json
/// { "level": "debug", "format": "json", "output": "stderr" }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Default level when no environment filter is set.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
    /// Output destination.
    pub output: LogOutput,
}

/// Builds the filter from `LOADFLOW_LOG`, then `RUST_LOG`, then `default_level`.
#[must_use]
pub fn env_filter(default_level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str()))
}

/// Installs the global subscriber. Returns false if one was already installed.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter = env_filter(config.level);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match (config.format, config.output) {
        (LogFormat::Console, LogOutput::Stdout) => builder.try_init(),
        (LogFormat::Console, LogOutput::Stderr) => builder.with_writer(std::io::stderr).try_init(),
        (LogFormat::Json, LogOutput::Stdout) => builder.json().try_init(),
        (LogFormat::Json, LogOutput::Stderr) => builder.json().with_writer(std::io::stderr).try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Console);
        assert_eq!(config.output, LogOutput::Stdout);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: LogConfig = serde_json::from_str(r#"{"level": "debug", "format": "json"}"#).unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output, LogOutput::Stdout);
    }

    #[test]
    fn test_second_init_is_rejected() {
        let config = LogConfig {
            output: LogOutput::Stderr,
            ..LogConfig::default()
        };
        init_logging(&config);
        assert!(!init_logging(&config));
    }
}
