//! Shared table of active watches.
//!
//! A source directory has at most one active entry across every manager
//! holding a clone of the same registry.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{FsOpsError, FsOpsResult};
use crate::model::WatchEntry;

/// Cloneable handle to a set of watch entries keyed by source directory.
#[derive(Clone, Default)]
pub struct WatchRegistry {
    entries: Arc<Mutex<HashMap<PathBuf, WatchEntry>>>,
}

impl fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("entries", &self.len())
            .finish()
    }
}

impl WatchRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `entry.source_dir` for `entry.owner`.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::AlreadyWatched`] when the directory is already
    /// claimed; the registry is left untouched.
    pub fn register(&self, entry: WatchEntry) -> FsOpsResult<()> {
        let mut entries = self.lock();
        if entries.contains_key(&entry.source_dir) {
            return Err(FsOpsError::AlreadyWatched {
                source_dir: entry.source_dir,
            });
        }
        debug!(
            source = %entry.source_dir.display(),
            owner = %entry.owner,
            "watch registered"
        );
        entries.insert(entry.source_dir.clone(), entry);
        Ok(())
    }

    /// Drop every entry owned by `owner`, returning them.
    pub fn unregister_all_for(&self, owner: Uuid) -> Vec<WatchEntry> {
        let mut entries = self.lock();
        let owned: Vec<PathBuf> = entries
            .values()
            .filter(|entry| entry.owner == owner)
            .map(|entry| entry.source_dir.clone())
            .collect();
        let mut released: Vec<WatchEntry> = owned
            .iter()
            .filter_map(|source| entries.remove(source))
            .collect();
        drop(entries);
        released.sort_by(|left, right| left.source_dir.cmp(&right.source_dir));
        debug!(owner = %owner, released = released.len(), "watches released");
        released
    }

    /// Whether `source_dir` is currently claimed.
    #[must_use]
    pub fn is_watched(&self, source_dir: &Path) -> bool {
        self.lock().contains_key(source_dir)
    }

    /// Entries owned by `owner`, ordered by source directory.
    #[must_use]
    pub fn entries_for(&self, owner: Uuid) -> Vec<WatchEntry> {
        let mut owned: Vec<WatchEntry> = self
            .lock()
            .values()
            .filter(|entry| entry.owner == owner)
            .cloned()
            .collect();
        owned.sort_by(|left, right| left.source_dir.cmp(&right.source_dir));
        owned
    }

    /// Number of active entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no entry is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, WatchEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("watch registry mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}
