//! Micro-batch directory ingestion and word-count pipeline.
//!
//! A producer drops files into a watched directory on a cadence; a polling
//! watcher hands each new file to the batch scheduler exactly once; every
//! batch interval the open batch is sealed, tokenized into alphabetic-run
//! words, counted, and written atomically under the output root.

pub mod aggregate;
pub mod batch;
pub mod cli;
pub mod config;
pub mod pipeline;
pub mod producer;
pub mod sink;
pub mod watcher;
