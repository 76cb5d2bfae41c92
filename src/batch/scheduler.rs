use crate::batch::{Batch, SourceFile};
use crate::config::types::{BackpressureConfig, BackpressureStrategy, SchedulerConfig};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("batch channel closed")]
    ChannelSend,
}

/// Owns the currently-open batch and the sequence counter.
///
/// Sequencing is this struct's single authority: the counter increments on
/// seal and nowhere else, so batch sequence numbers are strictly increasing
/// in emission order. The interval boundary is under the same authority:
/// `seal` never hands out a boundary in the same millisecond as the previous
/// one, since the boundary names the output file.
#[derive(Debug, Default)]
pub struct BatchScheduler {
    sequence: u64,
    last_interval_end: Option<DateTime<Utc>>,
    open: Vec<SourceFile>,
}

impl BatchScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a file to the currently-open batch, in arrival order.
    pub fn push(&mut self, file: SourceFile) {
        self.open.push(file);
    }

    /// Seal the open batch: assign the next sequence number and the interval
    /// boundary, and open a fresh empty batch. Files arriving after this call
    /// belong to the next batch.
    ///
    /// Timer ticks can land in the same millisecond after a stall; the
    /// boundary is clamped forward so consecutive seals never share a
    /// millisecond timestamp.
    pub fn seal(&mut self, interval_end: DateTime<Utc>) -> Batch {
        let interval_end = match self.last_interval_end {
            Some(prev) if interval_end.timestamp_millis() <= prev.timestamp_millis() => {
                prev + chrono::Duration::milliseconds(1)
            }
            _ => interval_end,
        };
        self.last_interval_end = Some(interval_end);

        let batch = Batch {
            id: Uuid::new_v4(),
            sequence: self.sequence,
            interval_end,
            files: std::mem::take(&mut self.open),
        };
        self.sequence += 1;
        batch
    }

    pub fn open_len(&self) -> usize {
        self.open.len()
    }
}

/// Run the batch scheduler task.
///
/// Accumulates files from the watcher, seals a batch every `batch_interval`,
/// and forwards sealed batches downstream under the configured backpressure
/// policy. When the input channel closes (graceful drain) the in-flight batch
/// is sealed and flushed before the task stops; forced cancellation discards
/// it instead.
///
/// Returns the number of batches actually emitted.
pub async fn run_scheduler(
    mut input: mpsc::Receiver<SourceFile>,
    output: mpsc::Sender<Batch>,
    scheduler_config: &SchedulerConfig,
    backpressure: &BackpressureConfig,
    cancel: CancellationToken,
) -> Result<u64, SchedulerError> {
    let mut state = BatchScheduler::new();
    let mut emitted: u64 = 0;

    // First tick one full interval out; an immediate tick would seal an
    // empty batch at startup. Ticks missed while a blocking send is in
    // progress must not fire back-to-back on resume, so the seals stay
    // interval-paced.
    let mut timer = interval_at(
        Instant::now() + scheduler_config.batch_interval,
        scheduler_config.batch_interval,
    );
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        batch_interval = ?scheduler_config.batch_interval,
        emit_empty = scheduler_config.emit_empty_batches,
        "Batch scheduler started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                warn!(
                    pending_files = state.open_len(),
                    "Scheduler cancelled, discarding open batch"
                );
                return Ok(emitted);
            }

            result = input.recv() => {
                match result {
                    Some(file) => {
                        debug!(path = %file.path.display(), "File accepted into open batch");
                        state.push(file);
                    }
                    None => {
                        // Watcher closed its side; flush the in-flight batch
                        break;
                    }
                }
            }

            _ = timer.tick() => {
                let batch = state.seal(Utc::now());
                if batch.is_empty() && !scheduler_config.emit_empty_batches {
                    debug!(sequence = batch.sequence, "Skipping empty batch");
                    continue;
                }
                if forward(batch, &output, backpressure.strategy).await? {
                    emitted += 1;
                }
            }
        }
    }

    let batch = state.seal(Utc::now());
    if !batch.is_empty() {
        info!(
            sequence = batch.sequence,
            files = batch.files.len(),
            "Flushing final batch"
        );
        if forward(batch, &output, backpressure.strategy).await? {
            emitted += 1;
        }
    }

    info!(batches = emitted, "Batch scheduler shutdown complete");

    Ok(emitted)
}

/// Send a sealed batch downstream, applying the backpressure policy when the
/// queue is full. Returns whether the batch was actually handed off.
async fn forward(
    batch: Batch,
    output: &mpsc::Sender<Batch>,
    strategy: BackpressureStrategy,
) -> Result<bool, SchedulerError> {
    match output.try_send(batch) {
        Ok(()) => Ok(true),
        Err(TrySendError::Full(batch)) => match strategy {
            BackpressureStrategy::Block => {
                warn!(
                    sequence = batch.sequence,
                    "Batch queue full, waiting for processing to catch up"
                );
                output
                    .send(batch)
                    .await
                    .map_err(|_| SchedulerError::ChannelSend)?;
                Ok(true)
            }
            BackpressureStrategy::Drop => {
                warn!(
                    sequence = batch.sequence,
                    files = batch.files.len(),
                    "Batch queue full, dropping sealed batch"
                );
                Ok(false)
            }
        },
        Err(TrySendError::Closed(_)) => Err(SchedulerError::ChannelSend),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{BackpressureConfig, BackpressureStrategy, SchedulerConfig};
    use std::path::PathBuf;
    use std::time::Duration;

    fn make_file(name: &str) -> SourceFile {
        SourceFile {
            path: PathBuf::from(name),
            discovered_at: Utc::now(),
        }
    }

    fn make_configs(
        batch_interval: Duration,
        emit_empty: bool,
    ) -> (SchedulerConfig, BackpressureConfig) {
        (
            SchedulerConfig {
                batch_interval,
                emit_empty_batches: emit_empty,
            },
            BackpressureConfig {
                strategy: BackpressureStrategy::Block,
                buffer_limit: 8,
            },
        )
    }

    #[test]
    fn test_seal_assigns_increasing_sequence() {
        let mut state = BatchScheduler::new();

        state.push(make_file("a.txt"));
        state.push(make_file("b.txt"));
        let first = state.seal(Utc::now());
        assert_eq!(first.sequence, 0);
        assert_eq!(first.files.len(), 2);
        assert_eq!(first.files[0].path, PathBuf::from("a.txt"));
        assert_eq!(first.files[1].path, PathBuf::from("b.txt"));

        // Sealed batch no longer accepts files; the next push lands in a
        // fresh batch with the next sequence number.
        state.push(make_file("c.txt"));
        let second = state.seal(Utc::now());
        assert_eq!(second.sequence, 1);
        assert_eq!(second.files.len(), 1);
        assert_eq!(second.files[0].path, PathBuf::from("c.txt"));
    }

    #[test]
    fn test_seal_never_repeats_a_millisecond_boundary() {
        let mut state = BatchScheduler::new();
        let now = Utc::now();

        // Same wall-clock instant passed repeatedly, as after a stall
        let mut previous = state.seal(now).interval_end.timestamp_millis();
        for _ in 0..5 {
            let sealed = state.seal(now).interval_end.timestamp_millis();
            assert!(sealed > previous);
            previous = sealed;
        }

        // A genuinely later boundary passes through unclamped
        let later = now + chrono::Duration::seconds(10);
        assert_eq!(state.seal(later).interval_end, later);
    }

    #[test]
    fn test_seal_empty_batch() {
        let mut state = BatchScheduler::new();
        let batch = state.seal(Utc::now());
        assert!(batch.is_empty());
        assert_eq!(batch.sequence, 0);
    }

    #[tokio::test]
    async fn test_files_within_interval_form_one_batch() {
        let (scheduler_config, backpressure) = make_configs(Duration::from_millis(100), false);
        let (file_tx, file_rx) = mpsc::channel(8);
        let (batch_tx, mut batch_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(async move {
            run_scheduler(file_rx, batch_tx, &scheduler_config, &backpressure, cancel_clone).await
        });

        file_tx.send(make_file("a.txt")).await.unwrap();
        file_tx.send(make_file("b.txt")).await.unwrap();

        let batch = batch_rx.recv().await.unwrap();
        assert_eq!(batch.sequence, 0);
        assert_eq!(batch.files.len(), 2);

        drop(file_tx);
        let emitted = handle.await.unwrap().unwrap();
        assert_eq!(emitted, 1);
    }

    #[tokio::test]
    async fn test_empty_intervals_respect_policy() {
        // emit_empty_batches = true: every interval produces a batch
        let (scheduler_config, backpressure) = make_configs(Duration::from_millis(50), true);
        let (file_tx, file_rx) = mpsc::channel::<SourceFile>(8);
        let (batch_tx, mut batch_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(async move {
            run_scheduler(file_rx, batch_tx, &scheduler_config, &backpressure, cancel_clone).await
        });

        let batch = batch_rx.recv().await.unwrap();
        assert!(batch.is_empty());

        drop(file_tx);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_empty_intervals_skipped_when_disabled() {
        let (scheduler_config, backpressure) = make_configs(Duration::from_millis(50), false);
        let (file_tx, file_rx) = mpsc::channel::<SourceFile>(8);
        let (batch_tx, mut batch_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(async move {
            run_scheduler(file_rx, batch_tx, &scheduler_config, &backpressure, cancel_clone).await
        });

        // Let several intervals elapse with no files, then close the input
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(file_tx);

        let emitted = handle.await.unwrap().unwrap();
        assert_eq!(emitted, 0);
        assert!(batch_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_input_close_flushes_in_flight_batch() {
        // Long interval: the batch would not seal on its own before the close
        let (scheduler_config, backpressure) = make_configs(Duration::from_secs(60), false);
        let (file_tx, file_rx) = mpsc::channel(8);
        let (batch_tx, mut batch_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(async move {
            run_scheduler(file_rx, batch_tx, &scheduler_config, &backpressure, cancel_clone).await
        });

        file_tx.send(make_file("a.txt")).await.unwrap();
        drop(file_tx);

        let batch = batch_rx.recv().await.unwrap();
        assert_eq!(batch.files.len(), 1);

        let emitted = handle.await.unwrap().unwrap();
        assert_eq!(emitted, 1);
    }

    #[tokio::test]
    async fn test_cancel_discards_open_batch() {
        let (scheduler_config, backpressure) = make_configs(Duration::from_secs(60), true);
        let (file_tx, file_rx) = mpsc::channel(8);
        let (batch_tx, mut batch_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(async move {
            run_scheduler(file_rx, batch_tx, &scheduler_config, &backpressure, cancel_clone).await
        });

        file_tx.send(make_file("a.txt")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let emitted = handle.await.unwrap().unwrap();
        assert_eq!(emitted, 0);
        assert!(batch_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stalled_consumer_gets_distinct_interval_ends() {
        // Capacity-1 queue and a consumer that stalls long enough for several
        // intervals to elapse: every batch that eventually comes through must
        // carry a distinct millisecond boundary, or downstream outputs keyed
        // on the timestamp would collide.
        let (scheduler_config, backpressure) = make_configs(Duration::from_millis(50), true);
        let (file_tx, file_rx) = mpsc::channel::<SourceFile>(8);
        let (batch_tx, mut batch_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(async move {
            run_scheduler(file_rx, batch_tx, &scheduler_config, &backpressure, cancel_clone).await
        });

        // Stall: the queue fills and the scheduler blocks on its next send
        tokio::time::sleep(Duration::from_millis(300)).await;

        let mut received = Vec::new();
        while received.len() < 6 {
            received.push(batch_rx.recv().await.unwrap());
        }
        drop(file_tx);
        while let Some(batch) = batch_rx.recv().await {
            received.push(batch);
        }
        handle.await.unwrap().unwrap();

        for pair in received.windows(2) {
            assert!(pair[0].sequence < pair[1].sequence);
            assert!(
                pair[0].interval_end.timestamp_millis() < pair[1].interval_end.timestamp_millis(),
                "batches {} and {} share boundary {}",
                pair[0].sequence,
                pair[1].sequence,
                pair[1].interval_end.timestamp_millis()
            );
        }
    }

    #[tokio::test]
    async fn test_drop_strategy_discards_when_queue_full() {
        let scheduler_config = SchedulerConfig {
            batch_interval: Duration::from_millis(50),
            emit_empty_batches: true,
        };
        let backpressure = BackpressureConfig {
            strategy: BackpressureStrategy::Drop,
            buffer_limit: 1,
        };
        let (file_tx, file_rx) = mpsc::channel::<SourceFile>(8);
        // Capacity-1 queue with no consumer: every batch after the first is dropped
        let (batch_tx, batch_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(async move {
            run_scheduler(file_rx, batch_tx, &scheduler_config, &backpressure, cancel_clone).await
        });

        tokio::time::sleep(Duration::from_millis(300)).await;
        drop(file_tx);
        let emitted = handle.await.unwrap().unwrap();
        assert_eq!(emitted, 1);

        drop(batch_rx);
    }
}
