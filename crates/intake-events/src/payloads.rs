//! Event payload types carried across the pipeline.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identifier assigned to each event emitted on the bus.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed domain events surfaced by file managers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A source directory was registered and its poller started.
    WatchStarted {
        /// Manager that owns the watch.
        manager_id: Uuid,
        /// Canonical source directory being polled.
        source_dir: String,
        /// Directory files are moved into.
        target_dir: String,
    },
    /// A newly seen file was handed to a move task.
    FileQueued {
        /// Manager whose coordinator dispatched the move.
        manager_id: Uuid,
        /// Absolute path of the discovered file.
        path: String,
    },
    /// A file was moved into its target directory.
    FileIngested {
        /// Manager that performed the move.
        manager_id: Uuid,
        /// Path the file was discovered at.
        source_path: String,
        /// Path the file now lives at.
        target_path: String,
        /// Identifier of the persisted record, absent when persistence failed.
        record_id: Option<Uuid>,
    },
    /// Moving a discovered file failed; the event was dropped.
    FileMoveFailed {
        /// Manager that attempted the move.
        manager_id: Uuid,
        /// Path the file was discovered at.
        path: String,
        /// Human-readable failure detail.
        message: String,
    },
    /// The file landed in its target but its metadata record was not written.
    RecordFailed {
        /// Manager that performed the move.
        manager_id: Uuid,
        /// Path of the moved file.
        path: String,
        /// Human-readable failure detail.
        message: String,
    },
    /// A manager finished teardown; none of its tasks are running.
    ManagerStopped {
        /// Manager that stopped.
        manager_id: Uuid,
    },
    /// System health status changed (degraded or restored components).
    HealthChanged {
        /// Components currently considered degraded.
        degraded: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator for log and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::WatchStarted { .. } => "watch_started",
            Self::FileQueued { .. } => "file_queued",
            Self::FileIngested { .. } => "file_ingested",
            Self::FileMoveFailed { .. } => "file_move_failed",
            Self::RecordFailed { .. } => "record_failed",
            Self::ManagerStopped { .. } => "manager_stopped",
            Self::HealthChanged { .. } => "health_changed",
        }
    }

    /// Manager the event belongs to, when it is manager-scoped.
    #[must_use]
    pub const fn manager_id(&self) -> Option<Uuid> {
        match self {
            Self::WatchStarted { manager_id, .. }
            | Self::FileQueued { manager_id, .. }
            | Self::FileIngested { manager_id, .. }
            | Self::FileMoveFailed { manager_id, .. }
            | Self::RecordFailed { manager_id, .. }
            | Self::ManagerStopped { manager_id } => Some(*manager_id),
            Self::HealthChanged { .. } => None,
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// Timestamp recording when the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}
