//! Validation helpers for configuration documents.

use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::model::IntakeConfig;

/// Check every field of a parsed configuration.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] naming the first offending field.
pub fn validate_config(config: &IntakeConfig) -> ConfigResult<()> {
    ensure_positive("poll_interval_ms", config.poll_interval_ms)?;
    ensure_positive("event_capacity", config.event_capacity)?;
    if let Some(limit) = config.max_concurrent_moves {
        ensure_positive("max_concurrent_moves", limit)?;
    }
    for (index, pair) in config.watch.iter().enumerate() {
        ensure_path(&format!("watch[{index}].source"), &pair.source)?;
        ensure_path(&format!("watch[{index}].target"), &pair.target)?;
        if pair.source == pair.target {
            return Err(ConfigError::InvalidField {
                field: format!("watch[{index}].target"),
                value: Some(pair.target.display().to_string()),
                reason: "target_equals_source",
            });
        }
    }
    Ok(())
}

fn ensure_positive<T>(field: &str, value: T) -> ConfigResult<()>
where
    T: Default + PartialEq + ToString,
{
    if value == T::default() {
        return Err(ConfigError::InvalidField {
            field: field.to_string(),
            value: Some(value.to_string()),
            reason: "must_be_positive",
        });
    }
    Ok(())
}

fn ensure_path(field: &str, path: &Path) -> ConfigResult<()> {
    if path.as_os_str().to_string_lossy().trim().is_empty() {
        return Err(ConfigError::InvalidField {
            field: field.to_string(),
            value: None,
            reason: "empty_path",
        });
    }
    Ok(())
}
