//! # Design
//!
//! - Provide structured, constant-message errors for the ingest pipeline.
//! - Capture operation context (paths, fields, inputs) without interpolating it into messages.
//! - Preserve source errors so callers can walk the chain.

use std::error::Error as _;
use std::io;
use std::path::PathBuf;

use intake_config::ConfigError;
use intake_data::DataError;
use thiserror::Error;
use tokio::task::JoinError;

/// Result type for ingest operations.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors produced by the watch, dedup, and move pipeline.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// IO failures while interacting with the filesystem.
    #[error("fsops io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Walkdir traversal failures.
    #[error("fsops walkdir failure")]
    Walkdir {
        /// Operation that triggered the walkdir failure.
        operation: &'static str,
        /// Path involved in the walkdir failure.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// The source directory already has an active watch.
    #[error("source directory already watched")]
    AlreadyWatched {
        /// Canonical source directory.
        source_dir: PathBuf,
    },
    /// Input validation failures.
    #[error("fsops invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// The manager has been torn down.
    #[error("file manager stopped")]
    ManagerStopped,
    /// Configuration could not be loaded or validated.
    #[error("fsops configuration failure")]
    Config {
        /// Underlying configuration error.
        source: ConfigError,
    },
    /// Metadata store failures surfaced to callers.
    #[error("metadata store failure")]
    Data {
        /// Operation that triggered the store failure.
        operation: &'static str,
        /// Underlying data-layer error.
        source: DataError,
    },
    /// A background task could not be joined.
    #[error("fsops background task failure")]
    Task {
        /// Operation that spawned the task.
        operation: &'static str,
        /// Underlying join error.
        source: JoinError,
    },
}

impl FsOpsError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn walkdir(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: walkdir::Error,
    ) -> Self {
        Self::Walkdir {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: &'static str, value: Option<String>) -> Self {
        Self::InvalidInput {
            field,
            reason,
            value,
        }
    }

    /// Message followed by every source message, joined with `: `.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut message = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            message.push_str(": ");
            message.push_str(&err.to_string());
            source = err.source();
        }
        message
    }
}
