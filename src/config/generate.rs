pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# HOPPER CONFIGURATION
# =============================================================================
# Hopper runs a micro-batch word-count pipeline: a producer drops files into a
# watched directory, a watcher hands each new file to the batch scheduler
# exactly once, and each interval's batch is tokenized, counted, and written
# atomically under the output root.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/hopper/config.yml
#   3. /etc/hopper/config.yml
#
# Durations accept ms/s/m/h suffixes, e.g. 250ms, 2s, 1m.
# Paths may use ~ and $env{VAR}.

# Simulates external data arrival: each tick, one file from source_root is
# copied (atomically, via temp name + rename) into the watched directory.
producer:
  source_root: ~/corpus
  # Pause between copies
  sleep: 1s
  # Stop after this many copies; the pipeline then drains and exits
  max_iterations: 10
  # Recursion depth when enumerating files under source_root
  max_depth: 4

watcher:
  path: /tmp/hopper/incoming
  # 'poll' is the only detection strategy today
  strategy: poll
  # Must be at most half of scheduler.batch_interval
  scan_interval: 500ms
  # Consecutive scan failures tolerated before the pipeline shuts down
  max_retries: 3
  retry_backoff: 500ms

scheduler:
  # Files arriving within one interval form one batch
  batch_interval: 2s
  # When true, intervals with no arrivals still produce an (empty) output
  emit_empty_batches: false

output:
  root: /tmp/hopper/out
  # Batch results land at <root>/<prefix>-<timestampMillis>.<extension>,
  # with a <prefix>-<timestampMillis>.done completion marker alongside
  prefix: wordcounts
  extension: tsv
  # When false, a batch whose completed output already exists is left as-is
  overwrite_completed: false

pipeline:
  backpressure:
    # 'block' queues sealed batches and warns when the queue is full;
    # 'drop' discards the just-sealed batch with a warning
    strategy: block
    buffer_limit: 64
"#
    .to_string()
}
