use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use intake_config::load_optional;
use intake_data::PgMetadataStore;
use intake_events::EventBus;
use intake_fsops::{FileManager, ManagerDeps, WatchRegistry};
use intake_telemetry::{
    DEFAULT_LOG_LEVEL, LogFormat, LogTarget, LoggingConfig, Metrics, log_format_from_str,
};
use sqlx::postgres::PgPoolOptions;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

const CONFIG_ENV: &str = "INTAKE_CONFIG";
const DATABASE_URL_ENV: &str = "DATABASE_URL";
const MAX_CONNECTIONS_ENV: &str = "INTAKE_DB_MAX_CONNECTIONS";
const LOG_LEVEL_ENV: &str = "INTAKE_LOG_LEVEL";
const LOG_FORMAT_ENV: &str = "INTAKE_LOG_FORMAT";
const LOG_FILE_ENV: &str = "INTAKE_LOG_FILE";

/// Commit stamped into every log line; set `INTAKE_BUILD_SHA` at compile time.
const BUILD_SHA: &str = stamped_sha(option_env!("INTAKE_BUILD_SHA"));

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Dependencies required to bootstrap the intake service.
pub(crate) struct BootstrapDependencies {
    config_path: Option<PathBuf>,
    database_url: String,
    max_connections: u32,
    log_level: String,
    log_format: LogFormat,
    log_target: LogTarget,
}

impl BootstrapDependencies {
    /// Read production dependencies from the process environment, after
    /// merging any `.env` file found in the working directory.
    pub(crate) fn from_env() -> AppResult<Self> {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            return Err(AppError::InvalidConfig {
                field: ".env",
                reason: "unreadable",
                value: Some(err.to_string()),
            });
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let database_url = non_blank(lookup(DATABASE_URL_ENV)).ok_or(AppError::MissingEnv {
            name: DATABASE_URL_ENV,
        })?;
        let max_connections = match non_blank(lookup(MAX_CONNECTIONS_ENV)) {
            Some(raw) => parse_max_connections(&raw)?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        Ok(Self {
            config_path: non_blank(lookup(CONFIG_ENV)).map(PathBuf::from),
            database_url,
            max_connections,
            log_level: non_blank(lookup(LOG_LEVEL_ENV))
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_format: log_format_from_str(lookup(LOG_FORMAT_ENV).as_deref())
                .unwrap_or_else(LogFormat::infer),
            log_target: LogTarget::from_setting(lookup(LOG_FILE_ENV).as_deref()),
        })
    }
}

/// Entry point for the intake service boot sequence.
///
/// # Errors
///
/// Returns an error if the environment is incomplete, startup fails, or the
/// manager cannot be torn down cleanly.
pub async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env()?;
    run_app_with(dependencies).await
}

/// Boot sequence that relies entirely on injected dependencies.
pub(crate) async fn run_app_with(dependencies: BootstrapDependencies) -> AppResult<()> {
    let logging = LoggingConfig {
        level: &dependencies.log_level,
        format: dependencies.log_format,
        target: dependencies.log_target.clone(),
        build_sha: BUILD_SHA,
    };
    intake_telemetry::init_logging(&logging)
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;

    info!(
        config = ?dependencies.config_path,
        max_connections = dependencies.max_connections,
        "intake bootstrap starting"
    );

    let config = load_optional(dependencies.config_path.as_deref())
        .map_err(|err| AppError::config("config.load", err))?;
    if config.watch.is_empty() {
        warn!("no watch pairs configured; the service will idle until stopped");
    }

    let pool = PgPoolOptions::new()
        .max_connections(dependencies.max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&dependencies.database_url)
        .await
        .map_err(|err| AppError::database("database.connect", err))?;
    let store = PgMetadataStore::new(pool.clone())
        .await
        .map_err(|err| AppError::data("metadata_store.new", err))?;

    let events = EventBus::new();
    let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
    let event_log = spawn_event_log(&events);

    let deps = ManagerDeps::new(
        WatchRegistry::new(),
        Arc::new(store),
        events,
        metrics.clone(),
    );
    let manager = match FileManager::from_config(deps, &config).await {
        Ok(manager) => manager,
        Err(err) => {
            event_log.abort();
            pool.close().await;
            return Err(AppError::fsops("manager.from_config", err));
        }
    };
    info!(
        manager_id = %manager.id(),
        watches = manager.watched_dirs().len(),
        "intake service ready"
    );

    let signal = wait_for_shutdown().await;
    match &signal {
        Ok(name) => info!(signal = *name, "shutdown requested"),
        Err(err) => warn!(error = %err, "signal listener failed; shutting down"),
    }

    let destroyed = manager.destroy().await;
    event_log.abort();
    pool.close().await;
    let snapshot = metrics.snapshot();
    info!(
        files_discovered = snapshot.files_discovered_total,
        moves_succeeded = snapshot.moves_succeeded,
        moves_failed = snapshot.moves_failed,
        records_failed = snapshot.records_failed,
        "intake service stopped"
    );

    destroyed.map_err(|err| AppError::fsops("manager.destroy", err))?;
    signal.map(|_| ())
}

fn spawn_event_log(events: &EventBus) -> JoinHandle<()> {
    let mut stream = events.subscribe(None);
    tokio::spawn(async move {
        while let Some(item) = stream.next().await {
            match item {
                Ok(envelope) => debug!(
                    event_id = envelope.id,
                    kind = envelope.event.kind(),
                    "event published"
                ),
                Err(err) => warn!(error = %err, "event log lagged behind the bus"),
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_shutdown() -> AppResult<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate =
        signal(SignalKind::terminate()).map_err(|err| AppError::io("signal.terminate", err))?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result
            .map(|()| "interrupt")
            .map_err(|err| AppError::io("signal.ctrl_c", err)),
        _ = terminate.recv() => Ok("terminate"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> AppResult<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::io("signal.ctrl_c", err))?;
    Ok("interrupt")
}

const fn stamped_sha(stamp: Option<&'static str>) -> &'static str {
    match stamp {
        Some(sha) if !sha.is_empty() => sha,
        _ => "dev",
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn parse_max_connections(raw: &str) -> AppResult<u32> {
    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(AppError::InvalidConfig {
            field: MAX_CONNECTIONS_ENV,
            reason: "not_a_positive_integer",
            value: Some(raw.to_string()),
        }),
    }
}
