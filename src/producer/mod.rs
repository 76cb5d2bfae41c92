use crate::config::types::ProducerConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("source root '{0}' contains no regular files")]
    SourceExhausted(PathBuf),

    #[error("failed to copy '{path}': {source}")]
    Copy {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Enumerate regular files under `root`, recursing at most `max_depth`
/// levels. Sorted by path so the drop order is deterministic.
pub fn enumerate_source_files(
    root: &Path,
    max_depth: usize,
) -> Result<Vec<PathBuf>, ProducerError> {
    let mut files = Vec::new();
    collect_files(root, max_depth, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_files(
    dir: &Path,
    depth_left: usize,
    files: &mut Vec<PathBuf>,
) -> Result<(), ProducerError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;

        if file_type.is_file() {
            files.push(entry.path());
        } else if file_type.is_dir() && depth_left > 0 {
            collect_files(&entry.path(), depth_left - 1, files)?;
        }
    }
    Ok(())
}

/// Copy `source` into `dest_dir` under `final_name` so it appears atomically:
/// the bytes land under a dot-prefixed temp name first, then a same-directory
/// rename makes them visible in one step.
pub async fn atomic_copy(
    source: &Path,
    dest_dir: &Path,
    final_name: &str,
) -> Result<(), ProducerError> {
    let tmp_path = dest_dir.join(format!(".{}.tmp", final_name));
    let final_path = dest_dir.join(final_name);

    let wrap = |source_err: std::io::Error| ProducerError::Copy {
        path: source.to_path_buf(),
        source: source_err,
    };

    let contents = tokio::fs::read(source).await.map_err(wrap)?;
    tokio::fs::write(&tmp_path, &contents).await.map_err(wrap)?;
    tokio::fs::rename(&tmp_path, &final_path)
        .await
        .map_err(wrap)?;

    Ok(())
}

/// Run the file-drop producer task.
///
/// Copies one source file per tick into the watched directory, cycling
/// through the enumerated corpus, for `max_iterations` ticks. Destination
/// names carry an iteration prefix so repeated drops of the same source file
/// stay distinct.
///
/// Stops early (returning the count so far) when the cancellation or drain
/// token fires between copies. Any copy failure is fatal.
pub async fn run_producer(
    config: &ProducerConfig,
    dest_dir: &Path,
    cancel: CancellationToken,
    drain: CancellationToken,
) -> Result<u64, ProducerError> {
    let sources = enumerate_source_files(&config.source_root, config.max_depth)?;
    if sources.is_empty() {
        return Err(ProducerError::SourceExhausted(config.source_root.clone()));
    }

    info!(
        source_root = %config.source_root.display(),
        files = sources.len(),
        max_iterations = config.max_iterations,
        "File-drop producer started"
    );

    let mut copied: u64 = 0;

    for iteration in 0..config.max_iterations {
        if cancel.is_cancelled() || drain.is_cancelled() {
            warn!(copied, "Producer stopping early on shutdown signal");
            return Ok(copied);
        }

        let source = &sources[(iteration as usize) % sources.len()];
        let base_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let final_name = format!("{:06}-{}", iteration, base_name);

        atomic_copy(source, dest_dir, &final_name).await?;
        copied += 1;
        debug!(
            source = %source.display(),
            dest = %dest_dir.join(&final_name).display(),
            "Dropped file"
        );

        // Sleep between copies, but wake immediately on shutdown
        tokio::select! {
            _ = cancel.cancelled() => {
                warn!(copied, "Producer cancelled during sleep");
                return Ok(copied);
            }
            _ = drain.cancelled() => {
                info!(copied, "Producer draining during sleep");
                return Ok(copied);
            }
            _ = tokio::time::sleep(config.sleep) => {}
        }
    }

    info!(copied, "File-drop producer finished");
    Ok(copied)
}
