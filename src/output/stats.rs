//! Run summaries and stored statistics
//!
//! This module prints the end-of-run summary and, for `--stats`, what the
//! state database knows about a target.

use crate::output::CrawlSummary;
use crate::storage::{RunRecord, StateStore, StorageResult};

/// Stored progress of one target
#[derive(Debug, Clone)]
pub struct StoredStatistics {
    pub target: String,

    /// Units completed successfully across all runs
    pub succeeded: u64,

    /// Units that failed permanently across all runs
    pub failed: u64,

    /// Last time completions were flushed
    pub last_updated: Option<String>,

    pub latest_run: Option<RunRecord>,
}

/// Loads the stored statistics of the store's target
pub fn load_statistics(store: &StateStore) -> StorageResult<StoredStatistics> {
    let (succeeded, failed) = store.completed_counts()?;

    Ok(StoredStatistics {
        target: store.target().to_string(),
        succeeded,
        failed,
        last_updated: store.last_updated(),
        latest_run: store.latest_run()?,
    })
}

/// Prints stored statistics to stdout
pub fn print_statistics(stats: &StoredStatistics) {
    println!("=== Crawl Statistics: {} ===\n", stats.target);

    let total = stats.succeeded + stats.failed;
    println!("Completed units: {}", total);
    println!("  Succeeded: {}", stats.succeeded);
    println!("  Failed: {}", stats.failed);
    if let Some(updated) = &stats.last_updated {
        println!("  Last updated: {}", updated);
    }
    println!();

    match &stats.latest_run {
        Some(run) => {
            println!("Latest run (#{}):", run.id);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
            println!("  Items extracted: {}", run.totals.items_extracted);
            println!("  Pages visited: {}", run.totals.pages_visited);
            println!("  Units failed: {}", run.totals.units_failed);
            println!("  Skipped via resume: {}", run.totals.units_skipped);
        }
        None => println!("No runs recorded."),
    }

    let success_rate = if total > 0 {
        (stats.succeeded as f64 / total as f64) * 100.0
    } else {
        0.0
    };
    println!("\nSuccess Rate: {:.1}%", success_rate);
}

/// Prints the summary of a finished run to stdout
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Crawl Summary ===\n");
    println!("  Items extracted: {}", summary.items_extracted);
    println!("  Pages visited: {}", summary.pages_visited);
    println!("  Units failed: {}", summary.units_failed);
    println!("  Skipped via resume: {}", summary.units_skipped_via_resume);
    if summary.duplicate_records > 0 {
        println!("  Duplicate records dropped: {}", summary.duplicate_records);
    }
    if summary.records_dropped > 0 {
        println!("  Records past max-items: {}", summary.records_dropped);
    }
    println!("  Stopped: {}", summary.stop_reason);

    let secs = summary.elapsed.as_secs_f64();
    if secs > 0.0 {
        println!(
            "  Elapsed: {:.1}s ({:.2} pages/sec)",
            secs,
            summary.pages_visited as f64 / secs
        );
    }
}
