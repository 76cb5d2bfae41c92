use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Set of file identities already handed off to the scheduler.
///
/// Owned exclusively by the watcher; guarantees each path is ingested at most
/// once even when the detection mechanism reports it in multiple scans.
#[derive(Debug, Default)]
pub struct WatermarkState {
    seen: HashSet<PathBuf>,
}

impl WatermarkState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful hand-off. Returns false if the path had already
    /// been ingested (duplicate observation).
    pub fn mark_ingested(&mut self, path: &Path) -> bool {
        self.seen.insert(path.to_path_buf())
    }

    pub fn is_ingested(&self, path: &Path) -> bool {
        self.seen.contains(path)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Cleared on watcher shutdown.
    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
