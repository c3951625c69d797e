//! Move-then-record step executed once per newly seen file.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use intake_data::{FileRecord, MetadataStore};
use intake_events::Event;
use intake_telemetry::{STATUS_ERROR, STATUS_OK};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{FsOpsError, FsOpsResult};
use crate::model::{FileEvent, MoveOutcome};
use crate::reporter::Reporter;

const HEALTH_COMPONENT: &str = "metadata_store";

#[derive(Clone)]
pub(crate) struct FileMover {
    manager_id: Uuid,
    store: Arc<dyn MetadataStore>,
    reporter: Reporter,
    store_degraded: Arc<Mutex<bool>>,
    limiter: Option<Arc<Semaphore>>,
}

impl fmt::Debug for FileMover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileMover")
            .field("manager_id", &self.manager_id)
            .field("limited", &self.limiter.is_some())
            .finish_non_exhaustive()
    }
}

impl FileMover {
    pub(crate) fn new(
        manager_id: Uuid,
        store: Arc<dyn MetadataStore>,
        reporter: Reporter,
        max_concurrent_moves: Option<usize>,
    ) -> Self {
        Self {
            manager_id,
            store,
            reporter,
            store_degraded: Arc::new(Mutex::new(false)),
            limiter: max_concurrent_moves.map(|limit| Arc::new(Semaphore::new(limit))),
        }
    }

    /// Rename the file into its target directory once, then record it.
    pub(crate) async fn relocate(&self, event: FileEvent) -> MoveOutcome {
        let _permit = match &self.limiter {
            Some(limiter) => match Arc::clone(limiter).acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => {
                    return self.fail(
                        event.path,
                        &FsOpsError::invalid("max_concurrent_moves", "limiter_closed", None),
                        false,
                    );
                }
            },
            None => None,
        };

        let destination = match destination_for(&event) {
            Ok(destination) => destination,
            Err(err) => return self.fail(event.path, &err, false),
        };
        if let Err(source) = tokio::fs::rename(&event.path, &destination).await {
            let source_missing = source.kind() == io::ErrorKind::NotFound
                && matches!(tokio::fs::try_exists(&event.path).await, Ok(false));
            let err = FsOpsError::io("mover.rename", &event.path, source);
            return self.fail(event.path, &err, source_missing);
        }
        self.reporter.metrics().inc_move(STATUS_OK);
        info!(
            manager_id = %self.manager_id,
            source = %event.path.display(),
            destination = %destination.display(),
            "file moved"
        );

        let record = self.record(&destination).await;
        self.reporter.publish(Event::FileIngested {
            manager_id: self.manager_id,
            source_path: event.path.display().to_string(),
            target_path: destination.display().to_string(),
            record_id: record.as_ref().map(|record| record.id),
        });
        MoveOutcome::Moved {
            source: event.path,
            destination,
            record,
        }
    }

    async fn record(&self, destination: &Path) -> Option<FileRecord> {
        match self.store.create_record(destination).await {
            Ok(record) => {
                self.reporter.metrics().inc_record(STATUS_OK);
                self.mark_recovered();
                Some(record)
            }
            Err(source) => {
                let err = FsOpsError::Data {
                    operation: "mover.create_record",
                    source,
                };
                let message = err.describe();
                self.reporter.metrics().inc_record(STATUS_ERROR);
                error!(
                    manager_id = %self.manager_id,
                    path = %destination.display(),
                    error = %message,
                    "failed to record moved file"
                );
                self.reporter.publish(Event::RecordFailed {
                    manager_id: self.manager_id,
                    path: destination.display().to_string(),
                    message: message.clone(),
                });
                self.mark_degraded(&message);
                None
            }
        }
    }

    fn fail(&self, source: PathBuf, err: &FsOpsError, source_missing: bool) -> MoveOutcome {
        let reason = err.describe();
        self.reporter.metrics().inc_move(STATUS_ERROR);
        warn!(
            manager_id = %self.manager_id,
            path = %source.display(),
            error = %reason,
            "failed to move file"
        );
        self.reporter.publish(Event::FileMoveFailed {
            manager_id: self.manager_id,
            path: source.display().to_string(),
            message: reason.clone(),
        });
        MoveOutcome::Failed {
            source,
            reason,
            source_missing,
        }
    }

    fn mark_degraded(&self, detail: &str) {
        let mut guard = self.lock_health_flag();
        if *guard {
            drop(guard);
            warn!(
                component = HEALTH_COMPONENT,
                detail = detail,
                "metadata store still degraded"
            );
        } else {
            *guard = true;
            drop(guard);
            warn!(
                component = HEALTH_COMPONENT,
                detail = detail,
                "metadata store degraded"
            );
            self.reporter.publish(Event::HealthChanged {
                degraded: vec![HEALTH_COMPONENT.to_string()],
            });
        }
    }

    fn mark_recovered(&self) {
        let mut guard = self.lock_health_flag();
        if std::mem::take(&mut *guard) {
            drop(guard);
            self.reporter
                .publish(Event::HealthChanged { degraded: vec![] });
            info!(component = HEALTH_COMPONENT, "metadata store recovered");
        }
    }

    fn lock_health_flag(&self) -> MutexGuard<'_, bool> {
        match self.store_degraded.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("mover health mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

fn destination_for(event: &FileEvent) -> FsOpsResult<PathBuf> {
    let name = event.path.file_name().ok_or_else(|| {
        FsOpsError::invalid(
            "path",
            "missing_file_name",
            Some(event.path.display().to_string()),
        )
    })?;
    Ok(event.target_dir.join(name))
}
