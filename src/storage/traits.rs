//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{CompletedUnit, FrontierRecord, RunRecord, RunStatus, RunTotals};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for state persistence backends
///
/// All data is partitioned by `target`, the output target a crawl writes
/// to. Writes that touch several rows must be atomic: a reader never sees
/// half of a flush.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new run for `target` in the `running` state
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, target: &str, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run of a target
    fn get_latest_run(&self, target: &str) -> StorageResult<Option<RunRecord>>;

    /// Records the final status, counters and finish timestamp of a run
    fn finish_run(&mut self, run_id: i64, status: RunStatus, totals: &RunTotals)
        -> StorageResult<()>;

    // ===== Completed Set =====

    /// Loads every completed unit key of a target
    fn load_completed(&self, target: &str) -> StorageResult<HashSet<String>>;

    /// Appends a batch of completed units in one transaction
    ///
    /// Completed units are also removed from the target's frontier, and the
    /// target's last-updated timestamp is bumped.
    fn append_completed(
        &mut self,
        target: &str,
        run_id: Option<i64>,
        units: &[CompletedUnit],
    ) -> StorageResult<()>;

    /// Counts completed units of a target as `(succeeded, failed)`
    fn count_completed(&self, target: &str) -> StorageResult<(u64, u64)>;

    /// Timestamp of the last flush for a target (RFC 3339)
    fn last_updated(&self, target: &str) -> StorageResult<Option<String>>;

    // ===== Frontier =====

    /// Replaces the stored frontier of a target
    fn save_frontier(&mut self, target: &str, units: &[FrontierRecord]) -> StorageResult<()>;

    /// Loads the stored frontier of a target
    fn load_frontier(&self, target: &str) -> StorageResult<Vec<FrontierRecord>>;

    // ===== Maintenance =====

    /// Forgets the completed set and frontier of a target
    ///
    /// Run history is kept.
    fn clear_target(&mut self, target: &str) -> StorageResult<()>;
}
