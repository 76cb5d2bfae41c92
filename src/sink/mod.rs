use crate::aggregate::{BatchCounts, FileWarning};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize completion marker: {0}")]
    Marker(#[from] serde_json::Error),
}

/// What the sink did with a batch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Output for this batch was already complete and overwrite is disabled.
    AlreadyComplete,
}

/// Destination for per-batch word counts.
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn write_batch(&self, result: &BatchCounts) -> Result<WriteOutcome, SinkError>;
}

/// Completion marker contents, written alongside the data file once it is
/// fully in place.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchMarker {
    pub batch_id: Uuid,
    pub sequence: u64,
    pub interval_end: DateTime<Utc>,
    pub files_counted: usize,
    pub distinct_words: usize,
    pub total_words: u64,
    pub warnings: Vec<FileWarning>,
}

/// Filesystem sink writing one `<prefix>-<timestampMillis>.<ext>` file per
/// batch under the output root.
///
/// Both the data file and the marker go through a dot-prefixed temp name and
/// a same-directory rename, so a reader never observes partial content. The
/// marker is renamed into place only after the data file is, which makes it a
/// completion signal for consumers that cannot rely on rename atomicity.
pub struct DirectorySink {
    root: PathBuf,
    prefix: String,
    extension: String,
    overwrite_completed: bool,
}

impl DirectorySink {
    pub fn new(
        root: PathBuf,
        prefix: String,
        extension: String,
        overwrite_completed: bool,
    ) -> Self {
        Self {
            root,
            prefix,
            extension,
            overwrite_completed,
        }
    }

    pub fn data_path(&self, interval_end: DateTime<Utc>) -> PathBuf {
        self.root.join(format!(
            "{}-{}.{}",
            self.prefix,
            interval_end.timestamp_millis(),
            self.extension
        ))
    }

    pub fn marker_path(&self, interval_end: DateTime<Utc>) -> PathBuf {
        self.root.join(format!(
            "{}-{}.done",
            self.prefix,
            interval_end.timestamp_millis()
        ))
    }

    async fn write_atomic(&self, final_path: &Path, contents: &[u8]) -> Result<(), SinkError> {
        // Temp name lives in the same directory as the target so the rename
        // never crosses a filesystem boundary.
        let file_name = final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = self.root.join(format!(".{}.tmp", file_name));

        tokio::fs::write(&tmp_path, contents).await?;
        tokio::fs::rename(&tmp_path, final_path).await?;
        Ok(())
    }
}

/// Render counts as sorted `word<TAB>count` lines.
pub fn render_counts(result: &BatchCounts) -> String {
    let mut out = String::new();
    for (word, count) in &result.counts {
        out.push_str(word);
        out.push('\t');
        out.push_str(&count.to_string());
        out.push('\n');
    }
    out
}

#[async_trait]
impl BatchSink for DirectorySink {
    async fn write_batch(&self, result: &BatchCounts) -> Result<WriteOutcome, SinkError> {
        let data_path = self.data_path(result.interval_end);
        let marker_path = self.marker_path(result.interval_end);

        // A marker implies a complete earlier write for this batch interval
        if !self.overwrite_completed && tokio::fs::try_exists(&marker_path).await? {
            debug!(
                path = %data_path.display(),
                sequence = result.sequence,
                "Output already complete, leaving as-is"
            );
            return Ok(WriteOutcome::AlreadyComplete);
        }

        tokio::fs::create_dir_all(&self.root).await?;

        self.write_atomic(&data_path, render_counts(result).as_bytes())
            .await?;

        let marker = BatchMarker {
            batch_id: result.batch_id,
            sequence: result.sequence,
            interval_end: result.interval_end,
            files_counted: result.files_counted,
            distinct_words: result.counts.len(),
            total_words: result.total_words(),
            warnings: result.warnings.clone(),
        };
        let marker_json = serde_json::to_vec_pretty(&marker)?;
        self.write_atomic(&marker_path, &marker_json).await?;

        info!(
            path = %data_path.display(),
            sequence = result.sequence,
            distinct_words = result.counts.len(),
            warnings = result.warnings.len(),
            "Wrote batch output"
        );

        Ok(WriteOutcome::Written)
    }
}
