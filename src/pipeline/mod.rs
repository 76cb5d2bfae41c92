pub mod runner;

use tokio::sync::mpsc;

pub use runner::{
    run_processor, start, PipelineControls, PipelineError, PipelineHandle, PipelineSummary,
};

/// Bounded hand-off between two pipeline stages; the capacity is the
/// backpressure buffer limit.
pub(crate) fn create_channel<T>(buffer_size: usize) -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
    mpsc::channel(buffer_size)
}
