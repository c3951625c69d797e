//! Telemetry initialisation primitives and logging configuration.
//!
//! # Design
//! - Centralises logging setup (fmt or JSON) with a single entry point.
//! - Records the build SHA once to avoid inconsistencies across modules.
//! - Output can go to stdout, a file, or nowhere at all.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use once_cell::sync::OnceCell;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Result, TelemetryError};

/// Default logging target when `RUST_LOG` is not provided.
pub const DEFAULT_LOG_LEVEL: &str = "info";

static BUILD_SHA: OnceCell<String> = OnceCell::new();

/// Configure and install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or the tracing
/// subscriber cannot be installed (for example, because another subscriber
/// has already been set globally).
pub fn init_logging(config: &LoggingConfig<'_>) -> Result<()> {
    let _ = BUILD_SHA.set(config.build_sha.to_string());

    let writer = build_writer(&config.target)?;
    let filter = build_env_filter(config.level);
    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(false)
                    .with_thread_ids(false),
            )
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(false)
                    .with_thread_ids(false),
            )
            .try_init(),
    }
    .map_err(|source| TelemetryError::SubscriberInstall { source })
}

/// Access the build SHA recorded during logging initialisation.
#[must_use]
pub fn build_sha() -> &'static str {
    BUILD_SHA.get().map_or("dev", String::as_str)
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Log level string (e.g., `info`, `debug`).
    pub level: &'a str,
    /// Output format selection for the tracing subscriber.
    pub format: LogFormat,
    /// Where formatted log lines are written.
    pub target: LogTarget,
    /// Build identifier recorded in structured logs.
    pub build_sha: &'a str,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
            target: LogTarget::Stdout,
            build_sha: build_sha(),
        }
    }
}

/// Available output formats for the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Emit logs as structured JSON objects.
    Json,
    /// Emit human-readable log lines.
    Pretty,
}

impl LogFormat {
    /// Choose a sensible default for the current build.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Destination for formatted log output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// Write to standard output.
    Stdout,
    /// Create (or truncate) the file and write to it.
    File(PathBuf),
    /// Drop all output.
    Discard,
}

impl LogTarget {
    /// Interpret an optional path setting: unset is stdout, `-` discards.
    #[must_use]
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::Stdout,
            Some("-") => Self::Discard,
            Some(path) => Self::File(PathBuf::from(path)),
        }
    }
}

/// Parse a log format name; unknown values fall back to [`LogFormat::infer`].
#[must_use]
pub fn log_format_from_str(value: Option<&str>) -> Option<LogFormat> {
    value.map(|value| match value.trim().to_ascii_lowercase().as_str() {
        "json" => LogFormat::Json,
        "pretty" => LogFormat::Pretty,
        _ => LogFormat::infer(),
    })
}

fn build_writer(target: &LogTarget) -> Result<BoxMakeWriter> {
    Ok(match target {
        LogTarget::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogTarget::Discard => BoxMakeWriter::new(std::io::sink),
        LogTarget::File(path) => {
            let file = File::create(path).map_err(|source| TelemetryError::LogFile {
                path: path.clone(),
                source,
            })?;
            BoxMakeWriter::new(Mutex::new(file))
        }
    })
}

fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_variants() {
        assert_eq!(log_format_from_str(Some("json")), Some(LogFormat::Json));
        assert_eq!(log_format_from_str(Some(" Pretty ")), Some(LogFormat::Pretty));
        assert_eq!(log_format_from_str(Some("other")), Some(LogFormat::infer()));
        assert!(log_format_from_str(None).is_none());
    }

    #[test]
    fn log_target_interprets_settings() {
        assert_eq!(LogTarget::from_setting(None), LogTarget::Stdout);
        assert_eq!(LogTarget::from_setting(Some("  ")), LogTarget::Stdout);
        assert_eq!(LogTarget::from_setting(Some("-")), LogTarget::Discard);
        assert_eq!(
            LogTarget::from_setting(Some("intake.log")),
            LogTarget::File(PathBuf::from("intake.log"))
        );
    }

    #[test]
    fn file_target_reports_unwritable_path() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::TempDir::new()?;
        let missing = temp.path().join("missing").join("intake.log");
        let err = build_writer(&LogTarget::File(missing))
            .err()
            .ok_or("expected log file error")?;
        assert!(matches!(err, TelemetryError::LogFile { .. }));
        Ok(())
    }

    #[test]
    fn init_logging_installs_subscriber_once() {
        let config = LoggingConfig {
            level: "info",
            format: LogFormat::Pretty,
            target: LogTarget::Discard,
            build_sha: "dev",
        };
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
