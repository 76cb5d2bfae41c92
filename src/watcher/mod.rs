pub mod watermark;

use crate::batch::SourceFile;
use crate::config::types::{WatchStrategy, WatcherConfig};
use chrono::Utc;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use watermark::WatermarkState;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("watched directory '{path}' unavailable: {source}")]
    DirectoryUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Polling observer for a single directory.
///
/// Assumes files appear atomically (created elsewhere and renamed into
/// place); a partially-written file is indistinguishable from a complete one,
/// so that precondition is the producer's to uphold. Hidden entries (leading
/// dot) are skipped, which also covers in-flight temp names.
pub struct DirectoryWatcher {
    path: PathBuf,
    watermark: WatermarkState,
}

impl DirectoryWatcher {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            watermark: WatermarkState::new(),
        }
    }

    /// One scan pass: regular, non-hidden files not yet handed off, ordered
    /// by (mtime, name) to approximate arrival order.
    ///
    /// Does not update the watermark; callers mark each file after a
    /// successful hand-off.
    pub fn scan(&self) -> Result<Vec<SourceFile>, WatchError> {
        let mut found: Vec<(SystemTime, OsString, PathBuf)> = Vec::new();

        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            let name = entry.file_name();

            if name.to_string_lossy().starts_with('.') {
                continue;
            }

            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }

            let path = entry.path();
            if self.watermark.is_ingested(&path) {
                continue;
            }

            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((modified, name, path));
        }

        found.sort();

        Ok(found
            .into_iter()
            .map(|(_, _, path)| SourceFile {
                path,
                discovered_at: Utc::now(),
            })
            .collect())
    }

    /// Record a successful hand-off to the scheduler.
    pub fn mark_ingested(&mut self, file: &SourceFile) -> bool {
        self.watermark.mark_ingested(&file.path)
    }

    pub fn ingested_count(&self) -> usize {
        self.watermark.len()
    }

    /// Watermark state lives only as long as the watcher runs.
    pub fn reset(&mut self) {
        self.watermark.clear();
    }
}

/// Run the directory watcher task.
///
/// Scans every `scan_interval` and hands newly-appeared files to the
/// scheduler exactly once, in discovery order. Scan failures are retried
/// `max_retries` times with a fixed backoff before the watcher gives up with
/// a fatal `DirectoryUnavailable`.
///
/// When the drain token fires, one final scan that began after the drain was
/// observed runs (so files renamed into place before the drain are still
/// picked up), then the output channel is closed by dropping the sender.
/// Returns the number of files handed off.
pub async fn run_watcher(
    config: &WatcherConfig,
    output: mpsc::Sender<SourceFile>,
    cancel: CancellationToken,
    drain: CancellationToken,
) -> Result<u64, WatchError> {
    // Single strategy today; match keeps the seam explicit.
    match config.strategy {
        WatchStrategy::Poll => {}
    }

    let mut watcher = DirectoryWatcher::new(config.path.clone());
    let mut ticker = interval(config.scan_interval);
    let mut failures: u32 = 0;
    let mut handed_off: u64 = 0;

    info!(
        path = %config.path.display(),
        scan_interval = ?config.scan_interval,
        "Directory watcher started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                watcher.reset();
                info!(files = handed_off, "Directory watcher cancelled");
                return Ok(handed_off);
            }

            _ = ticker.tick() => {
                // Only a scan that starts after the drain was observed can
                // be the final one: the drain promises every file renamed
                // into place beforehand is already visible to such a scan,
                // while a scan begun earlier may have raced the last rename.
                let final_scan = drain.is_cancelled();

                match watcher.scan() {
                    Ok(files) => {
                        failures = 0;
                        for file in files {
                            debug!(path = %file.path.display(), "Discovered file");
                            let marked = watcher.mark_ingested(&file);
                            debug_assert!(marked, "scan returned an already-ingested path");
                            if output.send(file).await.is_err() {
                                warn!("File channel closed, stopping watcher");
                                watcher.reset();
                                return Ok(handed_off);
                            }
                            handed_off += 1;
                        }

                        if final_scan {
                            break;
                        }
                    }
                    Err(e) => {
                        failures += 1;
                        if failures > config.max_retries {
                            error!(
                                path = %config.path.display(),
                                error = %e,
                                "Watched directory unavailable, giving up"
                            );
                            let source = match e {
                                WatchError::Io(io) => io,
                                WatchError::DirectoryUnavailable { source, .. } => source,
                            };
                            return Err(WatchError::DirectoryUnavailable {
                                path: config.path.clone(),
                                source,
                            });
                        }
                        warn!(
                            error = %e,
                            attempt = failures,
                            max_retries = config.max_retries,
                            "Directory scan failed, backing off"
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                watcher.reset();
                                return Ok(handed_off);
                            }
                            _ = tokio::time::sleep(config.retry_backoff) => {}
                        }
                    }
                }
            }
        }
    }

    watcher.reset();
    info!(files = handed_off, "Directory watcher shutdown complete");

    Ok(handed_off)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn watcher_config(path: PathBuf) -> WatcherConfig {
        WatcherConfig {
            path,
            strategy: WatchStrategy::Poll,
            scan_interval: Duration::from_millis(20),
            max_retries: 2,
            retry_backoff: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_scan_finds_regular_files_only() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        fs::write(dir.path().join(".a.txt.tmp"), "partial").unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();

        let watcher = DirectoryWatcher::new(dir.path().to_path_buf());
        let files = watcher.scan().unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, dir.path().join("a.txt"));
    }

    #[test]
    fn test_scan_skips_already_ingested() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();

        let mut watcher = DirectoryWatcher::new(dir.path().to_path_buf());

        let first = watcher.scan().unwrap();
        assert_eq!(first.len(), 1);
        watcher.mark_ingested(&first[0]);

        // Same directory contents: nothing new
        let second = watcher.scan().unwrap();
        assert!(second.is_empty());

        fs::write(dir.path().join("b.txt"), "beta").unwrap();
        let third = watcher.scan().unwrap();
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].path, dir.path().join("b.txt"));
    }

    #[test]
    fn test_scan_missing_directory_errors() {
        let watcher = DirectoryWatcher::new(PathBuf::from("/nonexistent/hopper-test"));
        assert!(watcher.scan().is_err());
    }

    #[tokio::test]
    async fn test_run_watcher_hands_off_each_file_once() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();

        let config = watcher_config(dir.path().to_path_buf());
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let drain = CancellationToken::new();

        let cancel_clone = cancel.clone();
        let drain_clone = drain.clone();
        let handle = tokio::spawn(async move {
            run_watcher(&config, tx, cancel_clone, drain_clone).await
        });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.path, dir.path().join("a.txt"));

        // A second file appears mid-run
        fs::write(dir.path().join("b.txt"), "beta").unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(second.path, dir.path().join("b.txt"));

        drain.cancel();
        let handed_off = handle.await.unwrap().unwrap();
        assert_eq!(handed_off, 2);

        // Channel closed after the final scan, with no duplicates
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_run_watcher_missing_directory_is_fatal() {
        let config = watcher_config(PathBuf::from("/nonexistent/hopper-test"));
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let drain = CancellationToken::new();

        let err = run_watcher(&config, tx, cancel, drain).await.unwrap_err();
        assert!(matches!(err, WatchError::DirectoryUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_file_renamed_just_before_drain_is_never_dropped() {
        // Tight write-then-drain sequences: whichever scan is in flight when
        // the drain fires, the file renamed into place beforehand must still
        // be handed off before the channel closes.
        for _ in 0..10 {
            let dir = TempDir::new().unwrap();
            let mut config = watcher_config(dir.path().to_path_buf());
            config.scan_interval = Duration::from_millis(5);

            let (tx, mut rx) = mpsc::channel(8);
            let cancel = CancellationToken::new();
            let drain = CancellationToken::new();

            let cancel_clone = cancel.clone();
            let drain_clone = drain.clone();
            let handle = tokio::spawn(async move {
                run_watcher(&config, tx, cancel_clone, drain_clone).await
            });

            fs::write(dir.path().join("last.txt"), "last").unwrap();
            drain.cancel();

            let handed_off = handle.await.unwrap().unwrap();
            assert_eq!(handed_off, 1);
            assert_eq!(rx.recv().await.unwrap().path, dir.path().join("last.txt"));
            assert!(rx.recv().await.is_none());
        }
    }

    #[tokio::test]
    async fn test_run_watcher_drain_picks_up_last_file() {
        let dir = TempDir::new().unwrap();
        let config = watcher_config(dir.path().to_path_buf());
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let drain = CancellationToken::new();

        let cancel_clone = cancel.clone();
        let drain_clone = drain.clone();
        let handle = tokio::spawn(async move {
            run_watcher(&config, tx, cancel_clone, drain_clone).await
        });

        // File lands, then the drain fires: at least one scan must still
        // observe it before the channel closes.
        fs::write(dir.path().join("late.txt"), "late").unwrap();
        drain.cancel();

        let file = rx.recv().await.unwrap();
        assert_eq!(file.path, dir.path().join("late.txt"));

        let handed_off = handle.await.unwrap().unwrap();
        assert_eq!(handed_off, 1);
    }
}
