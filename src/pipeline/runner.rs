use crate::aggregate::aggregate_batch;
use crate::batch::scheduler::{run_scheduler, SchedulerError};
use crate::batch::{Batch, SourceFile};
use crate::config::types::Config;
use crate::pipeline::create_channel;
use crate::producer::{run_producer, ProducerError};
use crate::sink::{BatchSink, DirectorySink, SinkError};
use crate::watcher::{run_watcher, WatchError};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors that can occur during pipeline operation
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("producer error: {0}")]
    Producer(#[from] ProducerError),

    #[error("watcher error: {0}")]
    Watcher(#[from] WatchError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Totals reported after a clean run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineSummary {
    pub files_copied: u64,
    pub files_ingested: u64,
    pub batches_emitted: u64,
}

/// Run the batch processor task.
///
/// Receives sealed batches, aggregates word counts, and writes each result
/// through the sink. Per-file read failures are warnings on the batch result;
/// a sink failure is fatal. Returns the number of batches written.
pub async fn run_processor(
    mut input: mpsc::Receiver<Batch>,
    sink: Arc<dyn BatchSink>,
    cancel: CancellationToken,
) -> Result<u64, PipelineError> {
    let mut written: u64 = 0;

    info!("Batch processor started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                warn!(batches = written, "Batch processor cancelled");
                return Ok(written);
            }

            result = input.recv() => {
                match result {
                    Some(batch) => {
                        debug!(
                            sequence = batch.sequence,
                            files = batch.files.len(),
                            "Processing batch"
                        );
                        let counts = aggregate_batch(&batch).await;
                        sink.write_batch(&counts).await?;
                        written += 1;
                    }
                    None => break,
                }
            }
        }
    }

    info!(batches = written, "Batch processor shutdown complete");

    Ok(written)
}

/// Handle to a running pipeline.
///
/// `request_shutdown` drains gracefully: the producer stops, the watcher runs
/// one last scan, and the in-flight batch is flushed. `force_stop` is
/// best-effort immediate and may leave the last batch un-emitted.
pub struct PipelineHandle {
    drain: CancellationToken,
    cancel: CancellationToken,
    task: JoinHandle<Result<PipelineSummary, PipelineError>>,
}

impl PipelineHandle {
    pub fn request_shutdown(&self) {
        self.drain.cancel();
    }

    pub fn force_stop(&self) {
        self.cancel.cancel();
    }

    /// Detached control surface, usable from another task while `wait` holds
    /// the handle itself.
    pub fn controls(&self) -> PipelineControls {
        PipelineControls {
            drain: self.drain.clone(),
            cancel: self.cancel.clone(),
        }
    }

    pub async fn wait(self) -> Result<PipelineSummary, PipelineError> {
        self.task.await?
    }
}

/// Cloneable shutdown controls for a running pipeline.
#[derive(Clone)]
pub struct PipelineControls {
    drain: CancellationToken,
    cancel: CancellationToken,
}

impl PipelineControls {
    pub fn request_shutdown(&self) {
        self.drain.cancel();
    }

    pub fn force_stop(&self) {
        self.cancel.cancel();
    }
}

/// Start the pipeline: watcher, scheduler, processor, and producer last (so
/// the producer never races an unready watcher).
pub fn start(config: Config) -> PipelineHandle {
    let cancel = CancellationToken::new();
    let drain = CancellationToken::new();

    let task = tokio::spawn(supervise(config, cancel.clone(), drain.clone()));

    PipelineHandle {
        drain,
        cancel,
        task,
    }
}

/// Spawn a component task; a component error cancels the shared token so
/// every other component unwinds at its next suspension point.
fn spawn_supervised<F>(
    cancel: CancellationToken,
    fut: F,
) -> JoinHandle<Result<u64, PipelineError>>
where
    F: Future<Output = Result<u64, PipelineError>> + Send + 'static,
{
    tokio::spawn(async move {
        let result = fut.await;
        if result.is_err() {
            cancel.cancel();
        }
        result
    })
}

async fn supervise(
    config: Config,
    cancel: CancellationToken,
    drain: CancellationToken,
) -> Result<PipelineSummary, PipelineError> {
    // Fail fast on an unusable filesystem layout, before any task launches
    tokio::fs::create_dir_all(&config.watcher.path).await?;
    tokio::fs::create_dir_all(&config.output.root).await?;

    let buffer_size = config.pipeline.backpressure.buffer_limit;
    let (file_tx, file_rx) = create_channel::<SourceFile>(buffer_size);
    let (batch_tx, batch_rx) = create_channel::<Batch>(buffer_size);

    let sink: Arc<dyn BatchSink> = Arc::new(DirectorySink::new(
        config.output.root.clone(),
        config.output.prefix.clone(),
        config.output.extension.clone(),
        config.output.overwrite_completed,
    ));

    info!("Starting pipeline tasks");

    let watcher_handle = spawn_supervised(cancel.clone(), {
        let watcher_config = config.watcher.clone();
        let cancel = cancel.clone();
        let drain = drain.clone();
        async move {
            run_watcher(&watcher_config, file_tx, cancel, drain)
                .await
                .map_err(PipelineError::from)
        }
    });

    let scheduler_handle = spawn_supervised(cancel.clone(), {
        let scheduler_config = config.scheduler.clone();
        let backpressure = config.pipeline.backpressure.clone();
        let cancel = cancel.clone();
        async move {
            run_scheduler(file_rx, batch_tx, &scheduler_config, &backpressure, cancel)
                .await
                .map_err(PipelineError::from)
        }
    });

    let processor_handle = spawn_supervised(cancel.clone(), {
        let cancel = cancel.clone();
        async move { run_processor(batch_rx, sink, cancel).await }
    });

    // Producer last: the watcher is already scanning by now
    let producer_handle = spawn_supervised(cancel.clone(), {
        let producer_config = config.producer.clone();
        let dest_dir = config.watcher.path.clone();
        let cancel = cancel.clone();
        let drain = drain.clone();
        async move {
            run_producer(&producer_config, &dest_dir, cancel, drain)
                .await
                .map_err(PipelineError::from)
        }
    });

    let mut first_error: Option<PipelineError> = None;
    let mut summary = PipelineSummary::default();

    // Producer completion (normal or via request_shutdown) triggers the drain
    // cascade: watcher final scan, channel close, scheduler flush, processor
    // drain. A producer error has already cancelled the shared token here.
    match producer_handle.await? {
        Ok(copied) => {
            summary.files_copied = copied;
            drain.cancel();
        }
        Err(e) => first_error = Some(e),
    }

    match watcher_handle.await? {
        Ok(ingested) => summary.files_ingested = ingested,
        Err(e) => {
            first_error.get_or_insert(e);
        }
    }

    match scheduler_handle.await? {
        Ok(_sealed) => {}
        Err(e) => {
            first_error.get_or_insert(e);
        }
    }

    match processor_handle.await? {
        Ok(written) => summary.batches_emitted = written,
        Err(e) => {
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => {
            warn!(error = %e, "Pipeline terminated with error");
            Err(e)
        }
        None => {
            info!(
                files_copied = summary.files_copied,
                files_ingested = summary.files_ingested,
                batches_emitted = summary.batches_emitted,
                "Pipeline shutdown complete"
            );
            Ok(summary)
        }
    }
}
