//! Domain models for the ingest pipeline.
//!
//! # Design
//! - Plain data passed between the registry, pollers, coordinator, and mover.
//! - Settings are resolved once per manager and copied into each task.

use std::path::{Path, PathBuf};
use std::time::Duration;

use intake_config::{IntakeConfig, SeenPolicy};
use intake_config::defaults::{DEFAULT_EVENT_CAPACITY, DEFAULT_POLL_INTERVAL_MS};
use intake_data::FileRecord;
use uuid::Uuid;

use crate::error::{FsOpsError, FsOpsResult};

/// An active watch: one source directory, where its files go, and the
/// manager that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    /// Canonical directory being polled.
    pub source_dir: PathBuf,
    /// Directory discovered files are moved into.
    pub target_dir: PathBuf,
    /// Manager that registered the watch.
    pub owner: Uuid,
}

/// A regular file seen by a poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// Absolute path of the discovered file.
    pub path: PathBuf,
    /// Target directory of the watch that found it.
    pub target_dir: PathBuf,
}

/// Result of one move task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The file now lives in its target directory.
    Moved {
        /// Path the file was discovered at.
        source: PathBuf,
        /// Path the file was moved to.
        destination: PathBuf,
        /// Persisted metadata, absent when the store write failed.
        record: Option<FileRecord>,
    },
    /// The file stayed where it was.
    Failed {
        /// Path the file was discovered at.
        source: PathBuf,
        /// Rendered failure chain.
        reason: String,
        /// The source path no longer existed when the move failed.
        source_missing: bool,
    },
}

impl MoveOutcome {
    /// Path the file was discovered at.
    #[must_use]
    pub fn source(&self) -> &Path {
        match self {
            Self::Moved { source, .. } | Self::Failed { source, .. } => source,
        }
    }

    /// Whether the file reached its target directory.
    #[must_use]
    pub const fn is_moved(&self) -> bool {
        matches!(self, Self::Moved { .. })
    }
}

/// Runtime knobs for one file manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Delay between walks of one source directory; also the state report period.
    pub poll_interval: Duration,
    /// Capacity of the poller-to-coordinator channel.
    pub event_capacity: usize,
    /// Cap on concurrently running moves; unbounded when `None`.
    pub max_concurrent_moves: Option<usize>,
    /// Seen-set pruning policy.
    pub seen_policy: SeenPolicy,
}

impl ManagerSettings {
    /// Reject settings that would stall or panic the runtime primitives.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::InvalidInput`] for a zero interval, capacity, or
    /// move cap.
    pub fn validate(&self) -> FsOpsResult<()> {
        if self.poll_interval.is_zero() {
            return Err(FsOpsError::invalid(
                "poll_interval",
                "must_be_positive",
                Some(format!("{:?}", self.poll_interval)),
            ));
        }
        if self.event_capacity == 0 {
            return Err(FsOpsError::invalid(
                "event_capacity",
                "must_be_positive",
                Some("0".to_string()),
            ));
        }
        if self.max_concurrent_moves == Some(0) {
            return Err(FsOpsError::invalid(
                "max_concurrent_moves",
                "must_be_positive",
                Some("0".to_string()),
            ));
        }
        Ok(())
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_concurrent_moves: None,
            seen_policy: SeenPolicy::default(),
        }
    }
}

impl From<&IntakeConfig> for ManagerSettings {
    fn from(config: &IntakeConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            event_capacity: config.event_capacity,
            max_concurrent_moves: config.max_concurrent_moves,
            seen_policy: config.seen_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config() {
        let config = IntakeConfig {
            poll_interval_ms: 150,
            event_capacity: 4,
            max_concurrent_moves: Some(2),
            seen_policy: SeenPolicy::ForgetAfterMove,
            ..IntakeConfig::default()
        };
        let settings = ManagerSettings::from(&config);
        assert_eq!(settings.poll_interval, Duration::from_millis(150));
        assert_eq!(settings.event_capacity, 4);
        assert_eq!(settings.max_concurrent_moves, Some(2));
        assert_eq!(settings.seen_policy, SeenPolicy::ForgetAfterMove);
    }

    #[test]
    fn zero_values_are_rejected() {
        let zero_interval = ManagerSettings {
            poll_interval: Duration::ZERO,
            ..ManagerSettings::default()
        };
        assert!(matches!(
            zero_interval.validate(),
            Err(FsOpsError::InvalidInput {
                field: "poll_interval",
                ..
            })
        ));

        let zero_cap = ManagerSettings {
            max_concurrent_moves: Some(0),
            ..ManagerSettings::default()
        };
        assert!(zero_cap.validate().is_err());
        assert!(ManagerSettings::default().validate().is_ok());
    }

    #[test]
    fn outcome_exposes_source() {
        let outcome = MoveOutcome::Failed {
            source: PathBuf::from("/in/a.txt"),
            reason: "denied".into(),
            source_missing: false,
        };
        assert_eq!(outcome.source(), Path::new("/in/a.txt"));
        assert!(!outcome.is_moved());
    }
}
