use crate::batch::Batch;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

/// A per-file failure recorded on the batch result instead of failing the
/// whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileWarning {
    pub path: PathBuf,
    pub reason: String,
}

/// Word-count result for one sealed batch. Counts are kept in a BTreeMap so
/// serialization order is deterministic regardless of file-processing order.
#[derive(Debug, Clone)]
pub struct BatchCounts {
    pub batch_id: Uuid,
    pub sequence: u64,
    pub interval_end: DateTime<Utc>,
    pub files_counted: usize,
    pub counts: BTreeMap<String, u64>,
    pub warnings: Vec<FileWarning>,
}

impl BatchCounts {
    /// Total occurrences across all words.
    pub fn total_words(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Tokenize into maximal runs of alphabetic characters. Any run of
/// non-alphabetic characters separates; case is preserved.
pub fn count_words(text: &str) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for word in text.split(|c: char| !c.is_alphabetic()) {
        if word.is_empty() {
            continue;
        }
        *counts.entry(word.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Merge `other` into `into` by commutative addition.
fn merge_counts(into: &mut BTreeMap<String, u64>, other: BTreeMap<String, u64>) {
    for (word, count) in other {
        *into.entry(word).or_insert(0) += count;
    }
}

async fn count_file(path: &Path) -> Result<BTreeMap<String, u64>, std::io::Error> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(count_words(&content))
}

/// Reduce a sealed batch into a single word-count mapping.
///
/// Files are read concurrently; the merge is commutative addition, so
/// processing order cannot affect the result. An unreadable file is skipped
/// with a warning attached to the batch rather than voiding it.
pub async fn aggregate_batch(batch: &Batch) -> BatchCounts {
    let reads = batch.files.iter().map(|file| count_file(&file.path));
    let results = join_all(reads).await;

    let mut counts = BTreeMap::new();
    let mut warnings = Vec::new();
    let mut files_counted = 0;

    for (file, result) in batch.files.iter().zip(results) {
        match result {
            Ok(file_counts) => {
                merge_counts(&mut counts, file_counts);
                files_counted += 1;
            }
            Err(e) => {
                warn!(
                    path = %file.path.display(),
                    error = %e,
                    sequence = batch.sequence,
                    "Skipping unreadable file in batch"
                );
                warnings.push(FileWarning {
                    path: file.path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    BatchCounts {
        batch_id: batch.id,
        sequence: batch.sequence,
        interval_end: batch.interval_end,
        files_counted,
        counts,
        warnings,
    }
}
