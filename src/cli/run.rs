use crate::config::parse::load_config;
use crate::pipeline;
use std::path::PathBuf;
use thiserror::Error;
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::parse::ConfigError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/hopper/config.yml");
            eprintln!("  /etc/hopper/config.yml");
            eprintln!("\nUse --config <path> to specify a config file, or run 'hopper config init' to generate one.");
            std::process::exit(1);
        }
    };

    run_pipeline(&config_path).await.map_err(|e| e.into())
}

async fn run_pipeline(config_path: &PathBuf) -> Result<(), RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");

    let config = load_config(config_path)?;

    info!(
        watched = %config.watcher.path.display(),
        output = %config.output.root.display(),
        batch_interval = ?config.scheduler.batch_interval,
        "Starting pipeline"
    );

    let handle = pipeline::start(config);
    let controls = handle.controls();

    info!("Pipeline started, press Ctrl+C for graceful shutdown (twice to force)");

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, draining in-flight batch");
            controls.request_shutdown();

            if signal::ctrl_c().await.is_ok() {
                warn!("Second shutdown signal, forcing stop; last batch may be lost");
                controls.force_stop();
            }
        }
    });

    let summary = handle.wait().await?;

    info!(
        files_copied = summary.files_copied,
        files_ingested = summary.files_ingested,
        batches_emitted = summary.batches_emitted,
        "Pipeline finished"
    );

    Ok(())
}
