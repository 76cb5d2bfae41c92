use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub producer: ProducerConfig,
    pub watcher: WatcherConfig,
    pub scheduler: SchedulerConfig,
    pub output: OutputConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Directory holding the corpus of files dropped into the watched directory.
    pub source_root: PathBuf,
    /// Pause between successive copies.
    #[serde(with = "duration_format")]
    pub sleep: Duration,
    /// Total number of copies before the producer stops.
    pub max_iterations: u64,
    /// How deep to recurse under source_root when enumerating files.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// The watched directory new files appear in.
    pub path: PathBuf,
    #[serde(default)]
    pub strategy: WatchStrategy,
    /// How often the watched directory is scanned for new files.
    #[serde(with = "duration_format")]
    pub scan_interval: Duration,
    /// Consecutive scan failures tolerated before the watcher gives up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pause between scan retries.
    #[serde(with = "duration_format", default = "default_retry_backoff")]
    pub retry_backoff: Duration,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff() -> Duration {
    Duration::from_millis(500)
}

/// Detection mechanism for new files. Polling is the only strategy today;
/// a native filesystem-event variant would slot in here.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchStrategy {
    #[default]
    Poll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Width of one micro-batch window.
    #[serde(with = "duration_format")]
    pub batch_interval: Duration,
    /// Whether intervals with no arrivals still produce an output.
    pub emit_empty_batches: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory batch results are written under.
    pub root: PathBuf,
    /// Filename prefix for batch outputs.
    pub prefix: String,
    /// Filename extension for batch outputs.
    pub extension: String,
    /// Whether a batch whose completed output already exists is rewritten.
    #[serde(default)]
    pub overwrite_completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub backpressure: BackpressureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackpressureConfig {
    pub strategy: BackpressureStrategy,
    #[serde(default = "default_buffer_limit")]
    pub buffer_limit: usize,
}

fn default_buffer_limit() -> usize {
    64
}

/// What happens when batch processing falls behind the batch interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressureStrategy {
    /// Wait for the queue to drain (queue-and-warn).
    Block,
    /// Discard the just-sealed batch (drop-and-warn).
    Drop,
}

// Custom serde module for duration parsing ("500ms", "2s", "1m", "1h")
pub(crate) mod duration_format {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty duration string".to_string());
        }

        let (value_str, unit) = if s.ends_with("ms") {
            (&s[..s.len() - 2], "ms")
        } else if s.ends_with('s') {
            (&s[..s.len() - 1], "s")
        } else if s.ends_with('m') {
            (&s[..s.len() - 1], "m")
        } else if s.ends_with('h') {
            (&s[..s.len() - 1], "h")
        } else {
            return Err(format!("invalid duration format: {}", s));
        };

        let value: u64 = value_str
            .parse()
            .map_err(|_| format!("invalid numeric value: {}", value_str))?;

        let duration = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            _ => return Err(format!("unknown unit: {}", unit)),
        };

        Ok(duration)
    }

    pub fn format_duration(d: Duration) -> String {
        let secs = d.as_secs();
        if secs > 0 && d.subsec_millis() == 0 {
            if secs % 3600 == 0 {
                format!("{}h", secs / 3600)
            } else if secs % 60 == 0 {
                format!("{}m", secs / 60)
            } else {
                format!("{}s", secs)
            }
        } else {
            format!("{}ms", d.as_millis())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::duration_format::{format_duration, parse_duration};
    use std::time::Duration;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("x5s").is_err());
    }

    #[test]
    fn test_format_duration_roundtrip() {
        for s in ["750ms", "3s", "2m", "1h"] {
            assert_eq!(format_duration(parse_duration(s).unwrap()), s);
        }
    }
}
