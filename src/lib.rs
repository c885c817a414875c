// ABOUTME: Library root for incremental-replicator
// ABOUTME: Watermark-based incremental table replication between PostgreSQL databases

//! Incrementally replicate rows from tables in a source PostgreSQL database
//! to a destination, copying only rows newer than each table's high-water
//! mark (the maximum of a timestamp column already present in the
//! destination). Designed as a schedulable batch job: repeated runs are
//! cheap and never re-transfer already-copied rows.

pub mod config;
pub mod error;
pub mod postgres;
pub mod preflight;
pub mod utils;
pub mod watermark;

pub use config::{SourceParams, TableSpec};
pub use error::{ErrorKind, ReplicationError, Result};
pub use watermark::{RunSummary, RunnerConfig, SyncOutcome, SyncRunner, Watermark};
