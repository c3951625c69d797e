//! Filesystem fixtures and polling helpers.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::{Instant, sleep};

const POLL_STEP: Duration = Duration::from_millis(20);

/// Poll `condition` until it returns `true` or `timeout` elapses.
///
/// Returns whether the condition was observed.
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(POLL_STEP).await;
    }
}

/// Write `contents` to `dir/name`, creating `dir` first.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(name);
    fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Names of the regular files directly inside `dir`, sorted.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn file_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_for_reports_timeout() {
        assert!(!wait_for(Duration::from_millis(50), || false).await);
        assert!(wait_for(Duration::from_millis(50), || true).await);
    }

    #[test]
    fn write_file_creates_parent_and_lists() -> Result<()> {
        let base = std::env::temp_dir().join(format!("intake-fixtures-{}", std::process::id()));
        let nested = base.join("nested");
        write_file(&nested, "b.txt", b"b")?;
        write_file(&nested, "a.txt", b"a")?;
        fs::create_dir_all(nested.join("sub"))?;
        assert_eq!(file_names(&nested)?, vec!["a.txt", "b.txt"]);
        fs::remove_dir_all(&base)?;
        Ok(())
    }
}
