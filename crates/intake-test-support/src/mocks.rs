//! In-memory metadata stores for exercising the pipeline without Postgres.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use intake_data::{DataError, DataResult, FileRecord, MetadataStore};

/// Store that keeps every created record in memory.
///
/// Clones share the same backing list, so a test can keep one handle while
/// the manager owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingStore {
    records: Arc<Mutex<Vec<FileRecord>>>,
    delay: Option<Duration>,
}

impl RecordingStore {
    /// Empty store that answers immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store that sleeps for `delay` before each write completes.
    #[must_use]
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            records: Arc::default(),
            delay: Some(delay),
        }
    }

    /// Snapshot of the records written so far, in write order.
    #[must_use]
    pub fn records(&self) -> Vec<FileRecord> {
        self.lock().clone()
    }

    /// Number of records written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no record has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FileRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MetadataStore for RecordingStore {
    async fn create_record(&self, path: &Path) -> DataResult<FileRecord> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let record = FileRecord::new_for_path(path)?;
        self.lock().push(record.clone());
        Ok(record)
    }

    async fn find_by_name(&self, name: &str) -> DataResult<Option<FileRecord>> {
        Ok(self
            .lock()
            .iter()
            .filter(|record| record.file_name == name)
            .max_by_key(|record| record.created_at)
            .cloned())
    }
}

/// Store whose writes fail until [`FailingStore::recover`] is called.
#[derive(Debug, Clone)]
pub struct FailingStore {
    failing: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
    inner: RecordingStore,
}

impl Default for FailingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FailingStore {
    /// Store that rejects every write.
    #[must_use]
    pub fn new() -> Self {
        Self {
            failing: Arc::new(AtomicBool::new(true)),
            attempts: Arc::new(AtomicUsize::new(0)),
            inner: RecordingStore::new(),
        }
    }

    /// Let subsequent writes succeed.
    pub fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    /// Number of `create_record` calls seen, failed or not.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Records written after recovery.
    #[must_use]
    pub fn records(&self) -> Vec<FileRecord> {
        self.inner.records()
    }
}

#[async_trait]
impl MetadataStore for FailingStore {
    async fn create_record(&self, path: &Path) -> DataResult<FileRecord> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(DataError::QueryFailed {
                operation: "files.insert",
                source: sqlx::Error::PoolTimedOut,
            });
        }
        self.inner.create_record(path).await
    }

    async fn find_by_name(&self, name: &str) -> DataResult<Option<FileRecord>> {
        self.inner.find_by_name(name).await
    }
}
