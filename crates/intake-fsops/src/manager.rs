//! Lifecycle glue: one manager owns a coordinator, its pollers, and the
//! registry entries it claimed.
//!
//! # Design
//! - Construction either yields a running manager or leaves nothing behind.
//! - `destroy` returns only once every task the manager spawned has exited.
//! - The state lock is always taken before the registry lock.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use intake_config::{IntakeConfig, load_from_path, validate::validate_config};
use intake_data::{FileRecord, MetadataStore};
use intake_events::{Event, EventBus};
use intake_telemetry::Metrics;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::coordinator::IngestCoordinator;
use crate::error::{FsOpsError, FsOpsResult};
use crate::model::{FileEvent, ManagerSettings, WatchEntry};
use crate::mover::FileMover;
use crate::poller::DirectoryPoller;
use crate::registry::WatchRegistry;
use crate::reporter::Reporter;

/// Collaborators handed to a [`FileManager`].
#[derive(Clone)]
pub struct ManagerDeps {
    /// Registry shared with every other manager that must not overlap.
    pub registry: WatchRegistry,
    /// Durable store for ingested file metadata.
    pub store: Arc<dyn MetadataStore>,
    /// Bus domain events are published on.
    pub events: EventBus,
    /// Metrics sink.
    pub metrics: Metrics,
    /// Runtime knobs.
    pub settings: ManagerSettings,
}

impl fmt::Debug for ManagerDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerDeps")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ManagerDeps {
    /// Bundle collaborators with default settings.
    #[must_use]
    pub fn new(
        registry: WatchRegistry,
        store: Arc<dyn MetadataStore>,
        events: EventBus,
        metrics: Metrics,
    ) -> Self {
        Self {
            registry,
            store,
            events,
            metrics,
            settings: ManagerSettings::default(),
        }
    }

    /// Replace the runtime knobs.
    #[must_use]
    pub fn with_settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = settings;
        self
    }
}

#[derive(Default)]
struct ManagerState {
    stopped: bool,
    pollers: Vec<JoinHandle<()>>,
    coordinator: Option<JoinHandle<()>>,
}

/// Watches source directories and moves every new regular file into its
/// target directory exactly once.
pub struct FileManager {
    id: Uuid,
    registry: WatchRegistry,
    store: Arc<dyn MetadataStore>,
    reporter: Reporter,
    settings: ManagerSettings,
    sender: mpsc::Sender<FileEvent>,
    cancel: CancellationToken,
    state: Mutex<ManagerState>,
}

impl fmt::Debug for FileManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileManager")
            .field("id", &self.id)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl FileManager {
    /// Start a manager with no watches; its coordinator is already running.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::InvalidInput`] when the settings are unusable.
    #[allow(clippy::unused_async)]
    pub async fn new(deps: ManagerDeps) -> FsOpsResult<Self> {
        let ManagerDeps {
            registry,
            store,
            events,
            metrics,
            settings,
        } = deps;
        settings.validate()?;

        let id = Uuid::new_v4();
        let reporter = Reporter::new(events, metrics);
        let cancel = CancellationToken::new();
        let (sender, receiver) = mpsc::channel(settings.event_capacity);
        let mover = FileMover::new(
            id,
            Arc::clone(&store),
            reporter.clone(),
            settings.max_concurrent_moves,
        );
        let coordinator = IngestCoordinator::new(
            id,
            receiver,
            cancel.clone(),
            mover,
            reporter.clone(),
            settings.seen_policy,
            settings.poll_interval,
        )
        .spawn();
        info!(manager_id = %id, "file manager started");

        Ok(Self {
            id,
            registry,
            store,
            reporter,
            settings,
            sender,
            cancel,
            state: Mutex::new(ManagerState {
                coordinator: Some(coordinator),
                ..ManagerState::default()
            }),
        })
    }

    /// Start a manager and watch every configured pair in order.
    ///
    /// The configuration's knobs replace `deps.settings`. If any pair fails,
    /// the partially started manager is destroyed before the error returns.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Config`] for invalid configuration, or the first
    /// error raised by [`FileManager::watch`].
    pub async fn from_config(deps: ManagerDeps, config: &IntakeConfig) -> FsOpsResult<Self> {
        validate_config(config).map_err(|source| FsOpsError::Config { source })?;
        let manager = Self::new(deps.with_settings(ManagerSettings::from(config))).await?;
        for pair in &config.watch {
            if let Err(err) = manager.watch(&pair.source, &pair.target).await {
                warn!(
                    manager_id = %manager.id,
                    source = %pair.source.display(),
                    error = %err.describe(),
                    "watch failed during startup; tearing down"
                );
                if let Err(teardown) = manager.destroy().await {
                    error!(
                        manager_id = %manager.id,
                        error = %teardown.describe(),
                        "teardown after failed startup did not complete"
                    );
                }
                return Err(err);
            }
        }
        Ok(manager)
    }

    /// Load a YAML configuration file, then behave like [`FileManager::from_config`].
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Config`] when the file cannot be loaded, or any
    /// error from [`FileManager::from_config`].
    pub async fn from_config_path(deps: ManagerDeps, path: &Path) -> FsOpsResult<Self> {
        let config = load_from_path(path).map_err(|source| FsOpsError::Config { source })?;
        Self::from_config(deps, &config).await
    }

    /// Begin polling `source` and moving its files into `target`.
    ///
    /// Both directories are created when missing.
    ///
    /// # Errors
    ///
    /// - [`FsOpsError::InvalidInput`] for an empty path, identical
    ///   directories, or a target inside the source.
    /// - [`FsOpsError::Io`] when a directory cannot be created or resolved.
    /// - [`FsOpsError::AlreadyWatched`] when `source` is already registered.
    /// - [`FsOpsError::ManagerStopped`] after [`FileManager::destroy`].
    pub async fn watch(&self, source: impl AsRef<Path>, target: impl AsRef<Path>) -> FsOpsResult<()> {
        let (source, target) = (source.as_ref(), target.as_ref());
        if self.lock_state().stopped {
            return Err(FsOpsError::ManagerStopped);
        }
        ensure_non_empty("source", source)?;
        ensure_non_empty("target", target)?;
        if source == target {
            return Err(same_directory(target));
        }

        create_dir(source).await?;
        create_dir(target).await?;
        let source_dir = canonical(source).await?;
        let target_dir = canonical(target).await?;
        if source_dir == target_dir {
            return Err(same_directory(target));
        }
        if target_dir.starts_with(&source_dir) {
            return Err(FsOpsError::invalid(
                "target",
                "target_inside_source",
                Some(target.display().to_string()),
            ));
        }

        let entry = WatchEntry {
            source_dir: source_dir.clone(),
            target_dir: target_dir.clone(),
            owner: self.id,
        };
        {
            let mut state = self.lock_state();
            if state.stopped {
                return Err(FsOpsError::ManagerStopped);
            }
            self.registry.register(entry.clone())?;
            let poller = DirectoryPoller::new(
                entry,
                self.settings.poll_interval,
                self.sender.clone(),
                self.cancel.clone(),
            )
            .spawn();
            state.pollers.push(poller);
        }

        self.reporter.metrics().inc_active_watches();
        info!(
            manager_id = %self.id,
            source = %source_dir.display(),
            target = %target_dir.display(),
            "watch started"
        );
        self.reporter.publish(Event::WatchStarted {
            manager_id: self.id,
            source_dir: source_dir.display().to_string(),
            target_dir: target_dir.display().to_string(),
        });
        Ok(())
    }

    /// Stop every poller, wait for in-flight moves, and release this
    /// manager's watches.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::ManagerStopped`] if the manager was already
    /// destroyed; nothing else is touched in that case.
    pub async fn destroy(&self) -> FsOpsResult<()> {
        let (pollers, coordinator) = {
            let mut state = self.lock_state();
            if state.stopped {
                return Err(FsOpsError::ManagerStopped);
            }
            state.stopped = true;
            (std::mem::take(&mut state.pollers), state.coordinator.take())
        };

        self.cancel.cancel();
        for poller in pollers {
            if let Err(err) = poller.await {
                error!(manager_id = %self.id, error = %err, "poller task failed");
            }
        }
        if let Some(coordinator) = coordinator
            && let Err(err) = coordinator.await
        {
            error!(manager_id = %self.id, error = %err, "coordinator task failed");
        }

        self.release_watches();
        self.reporter
            .publish(Event::ManagerStopped { manager_id: self.id });
        info!(manager_id = %self.id, "file manager stopped");
        Ok(())
    }

    /// Most recent metadata record for a file name.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Data`] when the store query fails.
    pub async fn find_one_file(&self, name: &str) -> FsOpsResult<Option<FileRecord>> {
        self.store
            .find_by_name(name)
            .await
            .map_err(|source| FsOpsError::Data {
                operation: "manager.find_one_file",
                source,
            })
    }

    /// Identifier used as the registry owner and in events.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Canonical source directories currently watched by this manager.
    #[must_use]
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        self.registry
            .entries_for(self.id)
            .into_iter()
            .map(|entry| entry.source_dir)
            .collect()
    }

    /// Runtime knobs in effect.
    #[must_use]
    pub const fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Whether [`FileManager::destroy`] has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.lock_state().stopped
    }

    fn release_watches(&self) {
        let released = self.registry.unregister_all_for(self.id);
        self.reporter
            .metrics()
            .sub_active_watches(i64::try_from(released.len()).unwrap_or(i64::MAX));
    }

    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("file manager state mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

/// Best-effort teardown for a manager that was never destroyed.
///
/// `drop` cannot await, so tasks are only signalled. Registry entries are
/// released immediately, while a cancelled poller may still be finishing its
/// current walk and an in-flight move may still complete. Until those tasks
/// exit, a new watch on the same source can overlap with them; call
/// [`FileManager::destroy`] when that window matters.
impl Drop for FileManager {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.stopped {
            return;
        }
        state.stopped = true;
        self.cancel.cancel();
        warn!(
            manager_id = %self.id,
            pollers = state.pollers.len(),
            "file manager dropped without destroy; tasks cancelled but not joined, watches released early"
        );
        self.release_watches();
    }
}

fn ensure_non_empty(field: &'static str, path: &Path) -> FsOpsResult<()> {
    if path.as_os_str().is_empty() {
        return Err(FsOpsError::invalid(field, "empty_path", None));
    }
    Ok(())
}

fn same_directory(target: &Path) -> FsOpsError {
    FsOpsError::invalid(
        "target",
        "target_equals_source",
        Some(target.display().to_string()),
    )
}

async fn create_dir(path: &Path) -> FsOpsResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| FsOpsError::io("manager.create_dir", path, source))
}

async fn canonical(path: &Path) -> FsOpsResult<PathBuf> {
    tokio::fs::canonicalize(path)
        .await
        .map_err(|source| FsOpsError::io("manager.canonicalize", path, source))
}
