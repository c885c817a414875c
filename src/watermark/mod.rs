// ABOUTME: Watermark-based sync module for incremental replication
// ABOUTME: Resume point resolution, incremental fetch, append load, and the table pipeline

pub mod reader;
pub mod resolver;
pub mod runner;
pub mod writer;

pub use reader::{IncrementalReader, RowBatch};
pub use resolver::{Watermark, WatermarkResolver};
pub use runner::{
    display_watermark, RunSummary, RunnerConfig, SyncOutcome, SyncPhase, SyncRunner, TableFailure,
};
pub use writer::{row_values, AppendWriter};
