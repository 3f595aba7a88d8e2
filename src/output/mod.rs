//! Output module for collected records and run summaries
//!
//! This module handles:
//! - The shared buffer records are appended to while the crawl runs
//! - The max-items ceiling, enforced at whole-record granularity
//! - Record cleanup and per-run dedup before records reach the buffer
//! - Writing records to a JSON-lines file that survives resumed runs
//! - The end-of-run summary and stored statistics

mod jsonl;
mod pipeline;
pub mod stats;

pub use jsonl::{write_json_lines, WriteMode};
pub use pipeline::{Processed, RecordPipeline};
pub use stats::{load_statistics, print_statistics, print_summary, StoredStatistics};

use crate::extract::Record;
use crate::storage::RunTotals;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Why a run stopped dispatching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopReason {
    /// Queue empty and nothing in flight
    #[default]
    Drained,
    /// The max-items ceiling was reached
    MaxItems,
    /// The max-pages ceiling was reached
    MaxPages,
    /// An external stop was requested
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Drained => "all work done",
            Self::MaxItems => "max-items reached",
            Self::MaxPages => "max-pages reached",
            Self::Cancelled => "cancelled",
        })
    }
}

/// What a finished run reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub items_extracted: u64,
    pub pages_visited: u64,
    pub units_failed: u64,
    /// Units not fetched because a prior run completed them
    pub units_skipped_via_resume: u64,
    /// Records produced after the max-items ceiling was hit
    pub records_dropped: u64,
    /// Records dropped as repeats of earlier records in the run
    pub duplicate_records: u64,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
}

impl CrawlSummary {
    /// Returns true if the run produced nothing at all
    pub fn is_total_failure(&self) -> bool {
        self.items_extracted == 0
    }

    /// Counters as recorded on the run row
    pub fn totals(&self) -> RunTotals {
        RunTotals {
            items_extracted: self.items_extracted,
            pages_visited: self.pages_visited,
            units_failed: self.units_failed,
            units_skipped: self.units_skipped_via_resume,
        }
    }
}

#[derive(Debug, Default)]
struct BufferInner {
    records: Vec<Record>,
    dropped: usize,
    closed: bool,
}

/// Records collected during a run
///
/// Workers append whole pages of records; records past the max-items
/// ceiling are dropped whole, never truncated. Consumers read the records
/// only once the buffer is closed at the end of the run.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    inner: Mutex<BufferInner>,
    max_items: Option<usize>,
}

impl OutputBuffer {
    pub fn new(max_items: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(BufferInner::default()),
            max_items,
        }
    }

    pub fn max_items(&self) -> Option<usize> {
        self.max_items
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BufferInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends one page's records in order
    ///
    /// Returns how many were accepted. Nothing is accepted once the ceiling
    /// is reached or the buffer is closed.
    pub fn append(&self, records: Vec<Record>) -> usize {
        let mut inner = self.lock();
        let offered = records.len();

        let room = if inner.closed {
            0
        } else {
            match self.max_items {
                Some(max) => max.saturating_sub(inner.records.len()),
                None => offered,
            }
        };

        let accepted = offered.min(room);
        inner.records.extend(records.into_iter().take(accepted));
        inner.dropped += offered - accepted;

        if accepted < offered {
            debug!("Dropped {} record(s) past the item ceiling", offered - accepted);
        }
        accepted
    }

    /// Number of records accepted so far
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true once the max-items ceiling is reached
    pub fn is_full(&self) -> bool {
        match self.max_items {
            Some(max) => self.len() >= max,
            None => false,
        }
    }

    pub fn dropped(&self) -> usize {
        self.lock().dropped
    }

    /// Signals that the run is complete; later appends are refused
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Takes the collected records, if the run is complete
    pub fn take_records(&self) -> Option<Vec<Record>> {
        let mut inner = self.lock();
        if !inner.closed {
            return None;
        }
        Some(std::mem::take(&mut inner.records))
    }
}
