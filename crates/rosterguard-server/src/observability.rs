//! Structured logging configuration.
//!
//! Log entries are text for development and JSON objects for production:
//!
//! ```json
//! {"timestamp":"2026-01-15T10:30:00.000Z","level":"WARN","target":"rosterguard_domain::resolver","fields":{"message":"member lookup failed, failing closed","email":"alice@example.org"}}
//! ```
//!
//! `RUST_LOG` overrides the configured level.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::config::{ConfigLoadError, LoggingSettings};

/// Configuration for structured logging.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Whether to use JSON format (true) or text format (false)
    pub json_format: bool,
    /// The default log level if RUST_LOG is not set
    pub default_level: Level,
    /// Whether to include span events (enter/exit)
    pub include_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json_format: false,
            default_level: Level::INFO,
            include_spans: false,
        }
    }
}

impl LoggingConfig {
    pub fn json() -> Self {
        Self {
            json_format: true,
            ..Default::default()
        }
    }

    pub fn text() -> Self {
        Self {
            json_format: false,
            ..Default::default()
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.include_spans = true;
        self
    }

    /// Builds a logging configuration from the `logging` settings section.
    pub fn from_settings(settings: &LoggingSettings) -> Result<Self, ConfigLoadError> {
        let level = parse_log_level(&settings.level)?;
        let base = if settings.json { Self::json() } else { Self::text() };
        Ok(base.with_level(level))
    }
}

/// Parses a case-insensitive log level name.
pub fn parse_log_level(level: &str) -> Result<Level, ConfigLoadError> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(ConfigLoadError::Invalid {
            message: format!("unknown log level: {other}"),
        }),
    }
}

/// Installs the global subscriber.
///
/// Only the first call in a process takes effect; returns false when a
/// subscriber was already installed.
pub fn init_logging(config: LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_level.to_string()));

    let span_events = if config.include_spans {
        FmtSpan::ENTER | FmtSpan::EXIT
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .json()
                .with_span_events(span_events)
                .with_current_span(true)
                .with_target(true)
                .with_file(false)
                .with_line_number(false),
        );
        tracing::subscriber::set_global_default(subscriber).is_ok()
    } else {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .pretty()
                .with_span_events(span_events)
                .with_target(true),
        );
        tracing::subscriber::set_global_default(subscriber).is_ok()
    }
}

/// JSON subscriber writing to `writer`, used to capture log output.
pub fn create_json_layer<W>(writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(EnvFilter::new("trace"))
        .with(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_current_span(true),
        )
}
