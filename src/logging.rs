//! Logging setup
//!
//! Stored dictionaries and the configuration loaders report through `tracing`
//! events. This module installs a `tracing-subscriber` formatter for binaries and
//! sessions that want to see them:
//! - Multiple output formats (pretty, compact, JSON)
//! - Environment-based filtering (`RUST_LOG` wins over the configured level)
//! - Level taken from the instrument configuration (`LOGGING.LEVEL`)
//!
//! Log lines go to stderr and carry the thread name, so writes made by a
//! background sync agent show up as `sync_agent_<key>`.
//!
//! # Example
//! ```no_run
//! use rust_bits::{config::IConfig, logging};
//! use tracing::info;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let iconfig = IConfig::default();
//! logging::init_from_iconfig(&iconfig)?;
//! info!("session started");
//! # Ok(())
//! # }
//! ```

use crate::config::IConfig;
use crate::error::{AppResult, BitsError};
use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed format with colors (for interactive sessions)
    Pretty,
    /// Compact single-line format without colors
    Compact,
    /// JSON format for log aggregation
    Json,
}

/// Logging configuration options
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: Level,
    /// Output format
    pub format: OutputFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Compact,
        }
    }
}

impl TracingConfig {
    /// Create logging config with the given level
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Create logging config from the instrument configuration.
    ///
    /// Reads `LOGGING.LEVEL`; absent means `info`.
    pub fn from_iconfig(iconfig: &IConfig) -> AppResult<Self> {
        let level = match iconfig
            .lookup(&["LOGGING", "LEVEL"])
            .and_then(|v| v.as_str())
        {
            Some(text) => parse_log_level(text)?,
            None => Level::INFO,
        };
        Ok(Self::new(level))
    }

    /// Set output format
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }
}

/// Initialize logging from the instrument configuration
pub fn init_from_iconfig(iconfig: &IConfig) -> AppResult<()> {
    init(TracingConfig::from_iconfig(iconfig)?)
}

/// Initialize logging with custom configuration
///
/// Idempotent: if a global subscriber is already installed this returns `Ok(())`,
/// so tests and libraries may call it freely.
pub fn init(config: TracingConfig) -> AppResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_to_filter_string(config.level)));

    tracing_subscriber::registry()
        .with(format_layer(config.format).with_filter(env_filter))
        .try_init()
        .or_else(|e| {
            // Expected in tests and when several components initialize logging
            if e
                .to_string()
                .contains("a global default trace dispatcher has already been set")
            {
                Ok(())
            } else {
                Err(BitsError::Configuration(format!(
                    "Failed to initialize logging: {e}"
                )))
            }
        })
}

fn format_layer(format: OutputFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = fmt::layer()
        .with_thread_names(true)
        .with_writer(std::io::stderr);
    match format {
        OutputFormat::Pretty => layer.pretty().boxed(),
        OutputFormat::Compact => layer.compact().with_ansi(false).boxed(),
        OutputFormat::Json => layer.json().boxed(),
    }
}

/// Parse log level string into tracing Level
pub fn parse_log_level(level: &str) -> AppResult<Level> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(BitsError::Configuration(format!(
            "Invalid log level '{level}'. Must be one of: trace, debug, info, warn, error"
        ))),
    }
}

fn level_to_filter_string(level: Level) -> String {
    level.as_str().to_lowercase()
}
