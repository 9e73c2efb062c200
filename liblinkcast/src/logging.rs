//! Logging setup shared by the library and the server binary
//!
//! Output goes to stderr in one of three formats. The level filter comes from
//! `RUST_LOG` when set, otherwise from the configured level.
//!
//! ```no_run
//! use liblinkcast::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "info".to_string(), false)
//!     .try_init()
//!     .expect("logging already initialized");
//! ```

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

use crate::error::{ConfigError, LinkcastError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text output (no colors, for piping)
    Text,
    /// One JSON object per line
    Json,
    /// Pretty-printed with colors (for development)
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    pub verbose: bool,
}

impl LoggingConfig {
    /// `verbose` forces the debug level unless `RUST_LOG` says otherwise
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Read `LINKCAST_LOG_FORMAT` and `LINKCAST_LOG_LEVEL`, defaulting to text/info
    pub fn from_env() -> Self {
        let format = std::env::var("LINKCAST_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(LogFormat::Text);

        let level = std::env::var("LINKCAST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Self::new(format, level, false)
    }

    fn filter(&self) -> EnvFilter {
        let fallback = if self.verbose { "debug" } else { self.level.as_str() };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
    }

    /// Install the global subscriber.
    ///
    /// Fails if a subscriber has already been installed.
    pub fn try_init(&self) -> Result<(), LinkcastError> {
        let filter = self.filter();

        let result = match self.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(true)
                .flatten_event(true)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true)
                .with_file(true)
                .try_init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true)
                .try_init(),
        };

        result.map_err(|e| ConfigError::Invalid(format!("logging: {}", e)).into())
    }
}

/// Initialize logging from the environment, ignoring a second initialization
pub fn init_default() {
    let _ = LoggingConfig::from_env().try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("Json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("PRETTY".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    }

    #[test]
    fn test_log_format_from_str_invalid() {
        let err = "xml".parse::<LogFormat>().unwrap_err();
        assert!(err.contains("Invalid log format: 'xml'"));
    }

    #[test]
    fn test_log_format_display_round_trips() {
        for format in [LogFormat::Text, LogFormat::Json, LogFormat::Pretty] {
            assert_eq!(format.to_string().parse::<LogFormat>().unwrap(), format);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_reads_linkcast_variables() {
        std::env::set_var("LINKCAST_LOG_FORMAT", "json");
        std::env::set_var("LINKCAST_LOG_LEVEL", "debug");
        let config = LoggingConfig::from_env();
        std::env::remove_var("LINKCAST_LOG_FORMAT");
        std::env::remove_var("LINKCAST_LOG_LEVEL");

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "debug");
        assert!(!config.verbose);
    }

    #[test]
    #[serial]
    fn test_from_env_falls_back_on_bad_format() {
        std::env::set_var("LINKCAST_LOG_FORMAT", "yaml");
        std::env::remove_var("LINKCAST_LOG_LEVEL");
        let config = LoggingConfig::from_env();
        std::env::remove_var("LINKCAST_LOG_FORMAT");

        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.level, "info");
    }
}
