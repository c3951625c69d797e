//! Typed configuration models.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults::{DEFAULT_EVENT_CAPACITY, DEFAULT_POLL_INTERVAL_MS};

/// One source directory to poll and the directory its files move into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchPair {
    /// Directory scanned for new files.
    pub source: PathBuf,
    /// Directory discovered files are moved into.
    pub target: PathBuf,
}

impl WatchPair {
    /// Convenience constructor.
    #[must_use]
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// How long a discovered path stays in the coordinator's seen-set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeenPolicy {
    /// Paths are remembered for the lifetime of the manager.
    #[default]
    Permanent,
    /// A path is forgotten once its move succeeded, so a file recreated at
    /// the same location is ingested again.
    ForgetAfterMove,
}

/// Validated intake configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntakeConfig {
    /// Watch pairs started in declaration order.
    pub watch: Vec<WatchPair>,
    /// Delay between two walks of one source directory, in milliseconds.
    pub poll_interval_ms: u64,
    /// Capacity of the discovery channel.
    pub event_capacity: usize,
    /// Upper bound on concurrently running moves; unbounded when unset.
    pub max_concurrent_moves: Option<usize>,
    /// Seen-set pruning policy.
    pub seen_policy: SeenPolicy,
}

impl IntakeConfig {
    /// Poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            watch: Vec::new(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_concurrent_moves: None,
            seen_policy: SeenPolicy::Permanent,
        }
    }
}
