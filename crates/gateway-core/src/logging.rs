//! Logging setup
//!
//! The library itself only emits `tracing` events. Applications embedding the client
//! can use [`setup_logging`] to install a formatted subscriber honoring `RUST_LOG`.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{GatewayError, GatewayResult};

/// Configuration for the logging subscriber
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default level, `RUST_LOG` directives are applied on top
    pub level: Level,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
    /// Include file and line information
    pub file_info: bool,
    /// Application name logged at startup
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            json: false,
            file_info: false,
            app_name: "rvoip-gateway".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level,
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Enable JSON formatting
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Enable file and line information in logs
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }
}

/// Install the global subscriber
///
/// Fails with a configuration error when a global subscriber is already set.
pub fn setup_logging(config: LoggingConfig) -> GatewayResult<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| GatewayError::config(format!("Cannot install subscriber: {}", e)))?;

    tracing::info!(app = %config.app_name, version = crate::VERSION, "Logging initialized");
    Ok(())
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> GatewayResult<Level> {
    Level::from_str(level).map_err(|_| GatewayError::config(format!("Invalid log level: {}", level)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(parse_log_level("chatty").is_err());
    }

    #[test]
    fn test_second_install_is_reported() {
        let _ = setup_logging(LoggingConfig::new(Level::DEBUG, "gateway-tests"));
        let second = setup_logging(LoggingConfig::default());
        assert!(matches!(second, Err(GatewayError::Configuration { .. })));
    }
}
