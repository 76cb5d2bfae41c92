pub mod scheduler;

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use uuid::Uuid;

pub use scheduler::{run_scheduler, SchedulerError};

/// A file handed off by the watcher. Immutable once discovered; its content
/// stays on disk and is read only at aggregation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub discovered_at: DateTime<Utc>,
}

/// One sealed micro-batch: every file handed off during one scheduling
/// interval, in arrival order.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Unique batch ID
    pub id: Uuid,

    /// Monotonic sequence number, assigned on seal under the scheduler's
    /// single authority. Starts at 0, increments by 1 per sealed batch.
    pub sequence: u64,

    /// Wall-clock boundary that closed this batch; names the output file.
    pub interval_end: DateTime<Utc>,

    /// Files assigned to this batch, in arrival order.
    pub files: Vec<SourceFile>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
