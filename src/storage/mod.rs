//! Storage module for persisting crawl progress
//!
//! This module handles everything that survives a restart:
//! - SQLite database initialization and schema management
//! - The completed-unit set that makes runs resumable
//! - The frontier of queued units, so pagination resumes where it stopped
//! - Run tracking (status, config hash, final counters)
//!
//! [`StateStore`] is the in-memory face of all this that the coordinator
//! talks to; it batches writes and degrades to memory-only operation when
//! the database stops cooperating.

mod schema;
mod sqlite;
mod state_store;
mod traits;

pub use sqlite::SqliteStorage;
pub use state_store::{FlushPolicy, StateStore};
pub use traits::{Storage, StorageError, StorageResult};

use chrono::{DateTime, Utc};

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub target: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub totals: RunTotals,
}

/// Final counters recorded on a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub items_extracted: u64,
    pub pages_visited: u64,
    pub units_failed: u64,
    pub units_skipped: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// How a completed unit ended
///
/// Failed units count as completed so a relaunch does not retry them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Success,
    Failed,
}

impl CompletionStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A completed unit waiting to be flushed
#[derive(Debug, Clone)]
pub struct CompletedUnit {
    /// Normalized URL of the unit
    pub key: String,
    pub status: CompletionStatus,
    pub completed_at: DateTime<Utc>,
}

/// A queued unit as persisted in the frontier table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierRecord {
    /// Normalized URL of the unit
    pub key: String,
    /// URL as it will be fetched
    pub url: String,
    pub depth: u32,
    pub discovered_from: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Interrupted,
            RunStatus::Failed,
        ] {
            let db_str = status.to_db_string();
            assert_eq!(Some(*status), RunStatus::from_db_string(db_str));
        }
    }

    #[test]
    fn test_run_status_invalid() {
        assert_eq!(RunStatus::from_db_string("invalid"), None);
    }

    #[test]
    fn test_completion_status_strings() {
        assert_eq!(CompletionStatus::Failed.to_db_string(), "failed");
        assert_eq!(
            CompletionStatus::from_db_string("success"),
            Some(CompletionStatus::Success)
        );
        assert_eq!(CompletionStatus::from_db_string("pending"), None);
    }
}
