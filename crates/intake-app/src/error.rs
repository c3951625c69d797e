//! # Design
//!
//! - Centralize application-level errors for bootstrap and shutdown.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::io;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Environment configuration was missing.
    #[error("missing environment configuration")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: &'static str,
    },
    /// Environment values were invalid.
    #[error("invalid configuration")]
    InvalidConfig {
        /// Field name that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Optional value associated with the failure.
        value: Option<String>,
    },
    /// Configuration file operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: intake_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: intake_telemetry::TelemetryError,
    },
    /// Database connectivity failed.
    #[error("database operation failed")]
    Database {
        /// Operation identifier.
        operation: &'static str,
        /// Source database error.
        source: sqlx::Error,
    },
    /// Metadata store operations failed.
    #[error("metadata store operation failed")]
    Data {
        /// Operation identifier.
        operation: &'static str,
        /// Source data error.
        source: intake_data::DataError,
    },
    /// File manager operations failed.
    #[error("file manager operation failed")]
    FsOps {
        /// Operation identifier.
        operation: &'static str,
        /// Source fsops error.
        source: intake_fsops::FsOpsError,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Source IO error.
        source: io::Error,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: intake_config::ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: intake_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn database(operation: &'static str, source: sqlx::Error) -> Self {
        Self::Database { operation, source }
    }

    pub(crate) const fn data(operation: &'static str, source: intake_data::DataError) -> Self {
        Self::Data { operation, source }
    }

    pub(crate) const fn fsops(operation: &'static str, source: intake_fsops::FsOpsError) -> Self {
        Self::FsOps { operation, source }
    }

    pub(crate) const fn io(operation: &'static str, source: io::Error) -> Self {
        Self::Io { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::path::PathBuf;

    #[test]
    fn app_error_helpers_build_variants() {
        let config = AppError::config(
            "config.load",
            intake_config::ConfigError::MissingWatchKey { path: None },
        );
        assert!(matches!(config, AppError::Config { .. }));

        let telemetry = AppError::telemetry(
            "telemetry.init",
            intake_telemetry::TelemetryError::LogFile {
                path: PathBuf::from("/var/log/intake.log"),
                source: io::Error::other("denied"),
            },
        );
        assert!(matches!(telemetry, AppError::Telemetry { .. }));

        let database = AppError::database("database.connect", sqlx::Error::PoolTimedOut);
        assert!(matches!(database, AppError::Database { .. }));

        let data = AppError::data(
            "metadata_store.new",
            intake_data::DataError::MissingFileName {
                path: PathBuf::from("/"),
            },
        );
        assert!(matches!(data, AppError::Data { .. }));

        let fsops = AppError::fsops("manager.destroy", intake_fsops::FsOpsError::ManagerStopped);
        assert!(matches!(fsops, AppError::FsOps { .. }));

        let io_err = AppError::io("signal.register", io::Error::other("denied"));
        assert!(matches!(io_err, AppError::Io { .. }));
    }

    #[test]
    fn messages_are_constant_and_sources_are_preserved() {
        let err = AppError::fsops("manager.destroy", intake_fsops::FsOpsError::ManagerStopped);
        assert_eq!(err.to_string(), "file manager operation failed");
        assert!(err.source().is_some());

        let missing = AppError::MissingEnv {
            name: "DATABASE_URL",
        };
        assert_eq!(missing.to_string(), "missing environment configuration");
        assert!(missing.source().is_none());
    }
}
