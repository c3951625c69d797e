//! YAML loading for intake configuration files.
//!
//! # Design
//! - A document must declare `watch`, even if the list is empty.
//! - Every loaded document passes through [`validate_config`] before use.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};
use crate::model::{IntakeConfig, SeenPolicy, WatchPair};
use crate::validate::validate_config;

#[derive(Debug, Deserialize)]
struct ConfigDocument {
    watch: Option<Vec<WatchPair>>,
    #[serde(default = "defaults::poll_interval_ms")]
    poll_interval_ms: u64,
    #[serde(default = "defaults::event_capacity")]
    event_capacity: usize,
    #[serde(default)]
    max_concurrent_moves: Option<usize>,
    #[serde(default)]
    seen_policy: SeenPolicy,
}

/// Read, parse, and validate a configuration file.
///
/// # Errors
///
/// Returns an error when the file cannot be read, is malformed, lacks the
/// `watch` key, or carries invalid values.
pub fn load_from_path(path: &Path) -> ConfigResult<IntakeConfig> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "config.read",
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_document(&raw, Some(path))?;
    info!(
        path = %path.display(),
        watches = config.watch.len(),
        "loaded intake configuration"
    );
    Ok(config)
}

/// Load configuration from `path` when supplied, otherwise fall back to
/// [`IntakeConfig::default`] (no watches).
///
/// # Errors
///
/// Propagates the errors of [`load_from_path`].
pub fn load_optional(path: Option<&Path>) -> ConfigResult<IntakeConfig> {
    match path {
        Some(path) => load_from_path(path),
        None => {
            debug!("no configuration file supplied; using defaults");
            Ok(IntakeConfig::default())
        }
    }
}

/// Parse and validate a configuration document held in memory.
///
/// # Errors
///
/// Returns an error when the document is malformed, lacks the `watch` key,
/// or carries invalid values.
pub fn parse_str(raw: &str) -> ConfigResult<IntakeConfig> {
    parse_document(raw, None)
}

fn parse_document(raw: &str, path: Option<&Path>) -> ConfigResult<IntakeConfig> {
    let origin = path.map(Path::to_path_buf);
    if raw.trim().is_empty() {
        return Err(ConfigError::MissingWatchKey { path: origin });
    }
    let document: ConfigDocument =
        serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.clone(),
            source,
        })?;
    let watch = document
        .watch
        .ok_or(ConfigError::MissingWatchKey { path: origin })?;
    let config = IntakeConfig {
        watch,
        poll_interval_ms: document.poll_interval_ms,
        event_capacity: document.event_capacity,
        max_concurrent_moves: document.max_concurrent_moves,
        seen_policy: document.seen_policy,
    };
    validate_config(&config)?;
    Ok(config)
}
