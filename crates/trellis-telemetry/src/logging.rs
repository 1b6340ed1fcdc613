//! Logging configuration and setup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::{TelemetryError, TelemetryResult};

/// File name prefix for rolling log files (`trellis.log.2026-01-15`).
const LOG_FILE_PREFIX: &str = "trellis.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line format with colors (default).
    #[default]
    Pretty,
    /// Compact single-line format.
    Compact,
    /// JSON, one object per line.
    Json,
    /// Single-line format with all fields.
    Full,
}

/// Log output target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Log to stdout.
    Stdout,
    /// Log to stderr.
    #[default]
    Stderr,
    /// Log to a daily rolling file in this directory.
    File(PathBuf),
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level filter (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_level")]
    pub level: String,
    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
    /// Log target.
    #[serde(default)]
    pub target: LogTarget,
    /// Per-crate directive overrides (e.g. `trellis_events=debug`).
    #[serde(default)]
    pub directives: Vec<String>,
    /// Emit span open/close events.
    #[serde(default)]
    pub include_spans: bool,
    /// Include thread ids on every line.
    #[serde(default)]
    pub include_thread_ids: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            directives: Vec::new(),
            include_spans: false,
            include_thread_ids: false,
        }
    }
}

impl LogConfig {
    /// Create a log config with the given level.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Default::default()
        }
    }

    /// Set the log format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the log target.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Add a directive override.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Emit span open/close events.
    #[must_use]
    pub fn with_spans(mut self) -> Self {
        self.include_spans = true;
        self
    }

    fn build_filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| TelemetryError::ConfigError(e.to_string()))?;

        for directive in &self.directives {
            filter = filter.add_directive(directive.parse().map_err(
                |e: tracing_subscriber::filter::ParseError| {
                    TelemetryError::ConfigError(format!("directive '{directive}': {e}"))
                },
            )?);
        }

        Ok(filter)
    }

    fn build_layer<W>(&self, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
    {
        let span_events = if self.include_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_thread_ids(self.include_thread_ids)
            .with_span_events(span_events);

        match self.format {
            LogFormat::Pretty => layer.pretty().boxed(),
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Json => layer.json().boxed(),
            LogFormat::Full => layer.boxed(),
        }
    }
}

#[cfg(feature = "config")]
impl From<&trellis_config::LoggingSection> for LogConfig {
    fn from(section: &trellis_config::LoggingSection) -> Self {
        let format = match section.format.as_str() {
            "compact" => LogFormat::Compact,
            "json" => LogFormat::Json,
            "full" => LogFormat::Full,
            _ => LogFormat::Pretty,
        };
        Self {
            level: section.level.clone(),
            format,
            directives: section.directives.clone(),
            ..Self::default()
        }
    }
}

fn init_err<E: std::fmt::Display>(e: E) -> TelemetryError {
    TelemetryError::InitError(e.to_string())
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// - [`TelemetryError::ConfigError`] if the level or a directive does not
///   parse.
/// - [`TelemetryError::IoError`] if the log directory cannot be created.
/// - [`TelemetryError::InitError`] if a global subscriber is already set.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.build_filter()?;

    let layer = match &config.target {
        LogTarget::Stdout => config.build_layer(std::io::stdout, true),
        LogTarget::Stderr => config.build_layer(std::io::stderr, true),
        LogTarget::File(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
            config.build_layer(appender, false)
        },
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(init_err)
}

/// Install default logging (info level, stderr, pretty format).
///
/// # Errors
///
/// Returns [`TelemetryError::InitError`] if a global subscriber is already
/// set.
pub fn setup_default_logging() -> TelemetryResult<()> {
    setup_logging(&LogConfig::default())
}
