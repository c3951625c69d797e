//! Periodic directory walker feeding the coordinator.
//!
//! # Design
//! - One task per watch entry; the walk itself runs on the blocking pool.
//! - Every await point races the manager's cancellation token, so teardown
//!   never waits on a full channel or a sleeping poller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{FsOpsError, FsOpsResult};
use crate::model::{FileEvent, WatchEntry};

pub(crate) struct DirectoryPoller {
    entry: WatchEntry,
    interval: Duration,
    sender: mpsc::Sender<FileEvent>,
    cancel: CancellationToken,
}

impl DirectoryPoller {
    pub(crate) const fn new(
        entry: WatchEntry,
        interval: Duration,
        sender: mpsc::Sender<FileEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            entry,
            interval,
            sender,
            cancel,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let source = self.entry.source_dir.clone();
        info!(
            source = %source.display(),
            target = %self.entry.target_dir.display(),
            "poller started"
        );
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            match scan_regular_files(source.clone()).await {
                Ok(files) => {
                    if !self.deliver(files).await {
                        break;
                    }
                }
                Err(FsOpsError::Walkdir { source: err, .. }) if is_not_found(&err) => {
                    warn!(source = %source.display(), "watched directory is missing");
                }
                Err(err) => {
                    warn!(
                        source = %source.display(),
                        error = %err.describe(),
                        "directory walk failed"
                    );
                }
            }
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }
        debug!(source = %source.display(), "poller stopped");
    }

    /// Hand each file to the coordinator in walk order. Returns `false` once
    /// the poller should stop.
    async fn deliver(&self, files: Vec<PathBuf>) -> bool {
        for path in files {
            let event = FileEvent {
                path,
                target_dir: self.entry.target_dir.clone(),
            };
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return false,
                sent = self.sender.send(event) => {
                    if sent.is_err() {
                        debug!(
                            source = %self.entry.source_dir.display(),
                            "coordinator channel closed"
                        );
                        return false;
                    }
                }
            }
        }
        true
    }
}

/// Regular files under `root`, recursively, sorted by file name per directory.
pub(crate) async fn scan_regular_files(root: PathBuf) -> FsOpsResult<Vec<PathBuf>> {
    tokio::task::spawn_blocking(move || walk(&root))
        .await
        .map_err(|source| FsOpsError::Task {
            operation: "poller.scan",
            source,
        })?
}

fn walk(root: &Path) -> FsOpsResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(err) if err.depth() == 0 => {
                return Err(FsOpsError::walkdir("poller.walk", root, err));
            }
            Err(err) => {
                debug!(
                    root = %root.display(),
                    path = ?err.path(),
                    error = %err,
                    "skipping unreadable entry"
                );
            }
        }
    }
    Ok(files)
}

fn is_not_found(err: &walkdir::Error) -> bool {
    err.io_error()
        .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use intake_test_support::fixtures::write_file;
    use std::fs;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn entry(source: &Path, target: &Path) -> WatchEntry {
        WatchEntry {
            source_dir: source.to_path_buf(),
            target_dir: target.to_path_buf(),
            owner: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn scan_returns_regular_files_in_name_order() -> Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path();
        write_file(root, "b.txt", b"b")?;
        write_file(root, "a.txt", b"a")?;
        write_file(&root.join("sub"), "c.txt", b"c")?;
        fs::create_dir_all(root.join("empty"))?;

        let files = scan_regular_files(root.to_path_buf()).await?;
        assert_eq!(
            files,
            vec![
                root.join("a.txt"),
                root.join("b.txt"),
                root.join("sub").join("c.txt"),
            ]
        );
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn scan_skips_symlinks() -> Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path();
        let real = write_file(root, "real.txt", b"r")?;
        std::os::unix::fs::symlink(&real, root.join("link.txt"))?;

        let files = scan_regular_files(root.to_path_buf()).await?;
        assert_eq!(files, vec![real]);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn scan_skips_unreadable_subdirectories() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new()?;
        let root = temp.path();
        let readable = write_file(root, "readable.txt", b"r")?;
        let locked = root.join("locked");
        write_file(&locked, "hidden.txt", b"h")?;
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000))?;

        let scanned = scan_regular_files(root.to_path_buf()).await;
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755))?;

        // Privileged users can still read the locked directory.
        let files = scanned?;
        assert!(files.contains(&readable));
        assert!(files.iter().all(|file| file.starts_with(root)));
        Ok(())
    }

    #[tokio::test]
    async fn scan_reports_missing_root() -> Result<()> {
        let temp = TempDir::new()?;
        let missing = temp.path().join("gone");
        match scan_regular_files(missing).await {
            Err(FsOpsError::Walkdir { source, .. }) => assert!(is_not_found(&source)),
            other => panic!("expected walkdir error, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn poller_emits_events_and_stops_on_cancel() -> Result<()> {
        let temp = TempDir::new()?;
        let source = temp.path().join("in");
        let target = temp.path().join("out");
        write_file(&source, "a.txt", b"a")?;

        let (sender, mut receiver) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = DirectoryPoller::new(
            entry(&source, &target),
            Duration::from_millis(20),
            sender,
            cancel.clone(),
        )
        .spawn();

        let event = tokio::time::timeout(Duration::from_secs(2), receiver.recv())
            .await?
            .ok_or_else(|| anyhow::anyhow!("channel closed"))?;
        assert_eq!(event.path, source.join("a.txt"));
        assert_eq!(event.target_dir, target);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle).await??;
        Ok(())
    }

    #[tokio::test]
    async fn cancellation_unblocks_a_full_channel() -> Result<()> {
        let temp = TempDir::new()?;
        let source = temp.path().join("in");
        for name in ["a.txt", "b.txt", "c.txt"] {
            write_file(&source, name, b"x")?;
        }

        let (sender, receiver) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let handle = DirectoryPoller::new(
            entry(&source, &temp.path().join("out")),
            Duration::from_secs(60),
            sender,
            cancel.clone(),
        )
        .spawn();

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle).await??;
        drop(receiver);
        Ok(())
    }

    #[tokio::test]
    async fn closed_channel_ends_the_loop() -> Result<()> {
        let temp = TempDir::new()?;
        let source = temp.path().join("in");
        write_file(&source, "a.txt", b"a")?;

        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let handle = DirectoryPoller::new(
            entry(&source, &temp.path().join("out")),
            Duration::from_secs(60),
            sender,
            CancellationToken::new(),
        )
        .spawn();
        tokio::time::timeout(Duration::from_secs(2), handle).await??;
        Ok(())
    }
}
