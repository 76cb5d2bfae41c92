use super::types::*;
use crate::config::{expand_env_vars, expand_tilde};
use regex::Regex;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    use std::io::Read;

    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    // Expand environment variables in the YAML string before parsing
    let yaml_string = expand_env_vars(&yaml_string);

    // Check for unexpanded environment variables
    check_unexpanded_vars(&yaml_string)?;

    let mut config: Config = serde_yaml::from_str(&yaml_string).map_err(|e| {
        // Wrap error with file context
        ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        ))
    })?;

    // Expand tilde in all paths
    expand_paths(&mut config);

    validate_config(&config)?;

    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    let mut unexpanded_vars: Vec<String> = re
        .captures_iter(yaml_string)
        .map(|cap| cap.get(1).unwrap().as_str().to_string())
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let var_list = unexpanded_vars.join(", ");
    let error_msg = if unexpanded_vars.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=/path/to/directory\n\
             2. Replace $env{{{0}}} in the config file with an actual path",
            unexpanded_vars[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variables (e.g., export TMPDIR=/tmp)\n\
             2. Replace the variables in the config file with actual paths",
            var_list
        )
    };

    Err(ConfigError::Validation(error_msg))
}

/// Expands tilde (~) in all PathBuf fields in the config.
fn expand_paths(config: &mut Config) {
    config.producer.source_root = expand_tilde(&config.producer.source_root);
    config.watcher.path = expand_tilde(&config.watcher.path);
    config.output.root = expand_tilde(&config.output.root);
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    validate_producer(&config.producer, &mut errors);
    validate_watcher(&config.watcher, &config.scheduler, &mut errors);
    validate_scheduler(&config.scheduler, &mut errors);
    validate_output(&config.output, config, &mut errors);
    validate_pipeline(&config.pipeline, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_producer(producer: &ProducerConfig, errors: &mut Vec<String>) {
    if producer.max_iterations == 0 {
        errors.push("producer.max_iterations must be at least 1".to_string());
    }
    if producer.source_root.as_os_str().is_empty() {
        errors.push("producer.source_root must not be empty".to_string());
    }
}

fn validate_watcher(
    watcher: &WatcherConfig,
    scheduler: &SchedulerConfig,
    errors: &mut Vec<String>,
) {
    if watcher.scan_interval.is_zero() {
        errors.push("watcher.scan_interval must be non-zero".to_string());
    }

    // A scan slower than half the batch window can starve a batch of files
    // that arrived during its interval.
    if !scheduler.batch_interval.is_zero()
        && watcher.scan_interval * 2 > scheduler.batch_interval
    {
        errors.push(format!(
            "watcher.scan_interval ({:?}) must be at most half of scheduler.batch_interval ({:?})",
            watcher.scan_interval, scheduler.batch_interval
        ));
    }

    if watcher.path.as_os_str().is_empty() {
        errors.push("watcher.path must not be empty".to_string());
    }
}

fn validate_scheduler(scheduler: &SchedulerConfig, errors: &mut Vec<String>) {
    if scheduler.batch_interval.is_zero() {
        errors.push("scheduler.batch_interval must be non-zero".to_string());
    }
}

fn validate_output(output: &OutputConfig, config: &Config, errors: &mut Vec<String>) {
    if output.prefix.is_empty() {
        errors.push("output.prefix must not be empty".to_string());
    }
    if output.extension.is_empty() {
        errors.push("output.extension must not be empty".to_string());
    }
    if output.root.as_os_str().is_empty() {
        errors.push("output.root must not be empty".to_string());
    }

    // Batch outputs landing in the watched directory would be re-ingested.
    if output.root == config.watcher.path {
        errors.push("output.root must not be the same directory as watcher.path".to_string());
    }
}

fn validate_pipeline(pipeline: &PipelineConfig, errors: &mut Vec<String>) {
    if pipeline.backpressure.buffer_limit == 0 {
        errors.push("pipeline.backpressure.buffer_limit must be at least 1".to_string());
    }
}
