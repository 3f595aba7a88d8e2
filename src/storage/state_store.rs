use crate::state::WorkUnit;
use crate::storage::traits::{Storage, StorageResult};
use crate::storage::{
    CompletedUnit, CompletionStatus, FrontierRecord, RunRecord, RunStatus, RunTotals,
    SqliteStorage,
};
use chrono::Utc;
use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// When pending completions are written out
#[derive(Debug, Clone, Copy)]
pub struct FlushPolicy {
    /// Flush once this many completions are pending
    pub every: usize,
    /// Flush once the oldest pending completion is this old
    pub interval: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            every: 10,
            interval: Duration::from_secs(5),
        }
    }
}

/// Resumable record of completed work units for one output target
///
/// The completed set lives in memory and is authoritative for the running
/// process; marks are batched and written to the backend according to the
/// [`FlushPolicy`]. A crash loses at most the unflushed batch, which the
/// next run simply redoes.
///
/// If the backend fails mid-run, the store logs a warning, drops the
/// backend and keeps going in memory-only mode.
pub struct StateStore {
    target: String,
    backend: Option<Box<dyn Storage + Send>>,
    completed: HashSet<String>,
    pending: Vec<CompletedUnit>,
    policy: FlushPolicy,
    last_flush: Instant,
    run_id: Option<i64>,
}

impl StateStore {
    /// Opens (or creates) the SQLite state database at `path`
    ///
    /// Loads the completed set of `target` if one exists.
    pub fn open(path: &Path, target: &str, policy: FlushPolicy) -> StorageResult<Self> {
        let storage = SqliteStorage::new(path)?;
        Self::with_storage(Box::new(storage), target, policy)
    }

    /// Builds a store over an arbitrary backend, loading `target`'s state
    pub fn with_storage(
        backend: Box<dyn Storage + Send>,
        target: &str,
        policy: FlushPolicy,
    ) -> StorageResult<Self> {
        let completed = backend.load_completed(target)?;
        if !completed.is_empty() {
            info!(
                "Loaded {} completed unit(s) for target '{}'",
                completed.len(),
                target
            );
        }

        Ok(Self {
            target: target.to_string(),
            backend: Some(backend),
            completed,
            pending: Vec::new(),
            policy,
            last_flush: Instant::now(),
            run_id: None,
        })
    }

    /// A store that never touches disk
    pub fn memory_only(target: &str) -> Self {
        Self {
            target: target.to_string(),
            backend: None,
            completed: HashSet::new(),
            pending: Vec::new(),
            policy: FlushPolicy::default(),
            last_flush: Instant::now(),
            run_id: None,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns false once the store runs in memory-only mode
    pub fn is_persistent(&self) -> bool {
        self.backend.is_some()
    }

    // ===== Run Bookkeeping =====

    /// Records the start of a run
    pub fn begin_run(&mut self, config_hash: &str) -> Option<i64> {
        let target = self.target.clone();
        let run_id = self.with_backend("create run", |b| b.create_run(&target, config_hash))?;
        self.run_id = Some(run_id);
        debug!("Started run {} for target '{}'", run_id, self.target);
        Some(run_id)
    }

    /// Records the end of the current run
    pub fn finish_run(&mut self, status: RunStatus, totals: &RunTotals) {
        if let Some(run_id) = self.run_id {
            self.with_backend("finish run", |b| b.finish_run(run_id, status, totals));
        }
    }

    /// The most recent run recorded for this target
    pub fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        match &self.backend {
            Some(backend) => backend.get_latest_run(&self.target),
            None => Ok(None),
        }
    }

    /// Stored `(succeeded, failed)` counts for this target
    pub fn completed_counts(&self) -> StorageResult<(u64, u64)> {
        match &self.backend {
            Some(backend) => backend.count_completed(&self.target),
            None => Ok((0, 0)),
        }
    }

    /// Timestamp of the last successful flush for this target
    pub fn last_updated(&self) -> Option<String> {
        self.backend
            .as_ref()
            .and_then(|b| b.last_updated(&self.target).ok().flatten())
    }

    // ===== Completed Set =====

    /// Returns true if the unit was completed in this or a prior run
    pub fn is_completed(&self, key: &str) -> bool {
        self.completed.contains(key)
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Number of marks not yet flushed
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Marks a unit completed
    ///
    /// Returns false if it was already completed; the set never shrinks and
    /// a unit is never recorded twice.
    pub fn mark(&mut self, key: &str, status: CompletionStatus) -> bool {
        if !self.completed.insert(key.to_string()) {
            return false;
        }

        if self.backend.is_some() {
            self.pending.push(CompletedUnit {
                key: key.to_string(),
                status,
                completed_at: Utc::now(),
            });
        }
        true
    }

    /// Whether the flush policy says pending marks should be written now
    pub fn flush_due(&self) -> bool {
        !self.pending.is_empty()
            && (self.pending.len() >= self.policy.every
                || self.last_flush.elapsed() >= self.policy.interval)
    }

    /// Writes all pending marks in one transaction
    pub fn flush(&mut self) {
        self.last_flush = Instant::now();
        if self.pending.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut self.pending);
        let target = self.target.clone();
        let run_id = self.run_id;

        if self
            .with_backend("flush completed units", |b| {
                b.append_completed(&target, run_id, &batch)
            })
            .is_some()
        {
            debug!("Flushed {} completed unit(s)", batch.len());
        }
    }

    /// Forgets all progress of this target (fresh start)
    pub fn clear(&mut self) {
        self.completed.clear();
        self.pending.clear();
        let target = self.target.clone();
        if self
            .with_backend("clear target", |b| b.clear_target(&target))
            .is_some()
        {
            info!("Cleared stored progress for target '{}'", self.target);
        }
    }

    // ===== Frontier =====

    /// Persists the units still waiting to be completed
    pub fn save_frontier(&mut self, units: &[WorkUnit]) {
        if self.backend.is_none() {
            return;
        }

        let records: Vec<FrontierRecord> = units
            .iter()
            .map(|unit| FrontierRecord {
                key: unit.key().to_string(),
                url: unit.url().to_string(),
                depth: unit.depth(),
                discovered_from: unit.discovered_from().map(|u| u.to_string()),
            })
            .collect();

        let target = self.target.clone();
        self.with_backend("save frontier", |b| b.save_frontier(&target, &records));
    }

    /// Loads the frontier left by an earlier run
    ///
    /// Units completed in the meantime and unparseable rows are skipped.
    pub fn load_frontier(&self) -> Vec<WorkUnit> {
        let backend = match &self.backend {
            Some(backend) => backend,
            None => return Vec::new(),
        };

        let records = match backend.load_frontier(&self.target) {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to load stored frontier: {}", e);
                return Vec::new();
            }
        };

        records
            .into_iter()
            .filter(|r| !self.completed.contains(&r.key))
            .filter_map(|r| {
                match WorkUnit::restore(&r.url, r.depth, r.discovered_from.as_deref()) {
                    Ok(unit) => Some(unit),
                    Err(e) => {
                        warn!("Skipping stored frontier entry '{}': {}", r.url, e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Runs a backend operation, degrading to memory-only on failure
    fn with_backend<T>(
        &mut self,
        what: &str,
        op: impl FnOnce(&mut dyn Storage) -> StorageResult<T>,
    ) -> Option<T> {
        let backend = self.backend.as_mut()?;
        match op(&mut **backend) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    "State store failed to {}: {}; continuing in memory-only mode",
                    what, e
                );
                self.backend = None;
                self.pending.clear();
                None
            }
        }
    }
}

impl Drop for StateStore {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            self.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StorageError, StorageResult};
    use std::collections::HashSet;

    fn policy(every: usize) -> FlushPolicy {
        FlushPolicy {
            every,
            interval: Duration::from_secs(3600),
        }
    }

    fn in_memory_store(target: &str, every: usize) -> StateStore {
        let storage = SqliteStorage::new_in_memory().unwrap();
        StateStore::with_storage(Box::new(storage), target, policy(every)).unwrap()
    }

    /// Backend whose writes always fail
    struct BrokenStorage;

    impl Storage for BrokenStorage {
        fn create_run(&mut self, _: &str, _: &str) -> StorageResult<i64> {
            Err(StorageError::Database("disk full".into()))
        }
        fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
            Err(StorageError::RunNotFound(run_id))
        }
        fn get_latest_run(&self, _: &str) -> StorageResult<Option<RunRecord>> {
            Ok(None)
        }
        fn finish_run(&mut self, _: i64, _: RunStatus, _: &RunTotals) -> StorageResult<()> {
            Err(StorageError::Database("disk full".into()))
        }
        fn load_completed(&self, _: &str) -> StorageResult<HashSet<String>> {
            Ok(HashSet::new())
        }
        fn append_completed(
            &mut self,
            _: &str,
            _: Option<i64>,
            _: &[CompletedUnit],
        ) -> StorageResult<()> {
            Err(StorageError::Database("disk full".into()))
        }
        fn count_completed(&self, _: &str) -> StorageResult<(u64, u64)> {
            Ok((0, 0))
        }
        fn last_updated(&self, _: &str) -> StorageResult<Option<String>> {
            Ok(None)
        }
        fn save_frontier(&mut self, _: &str, _: &[FrontierRecord]) -> StorageResult<()> {
            Err(StorageError::Database("disk full".into()))
        }
        fn load_frontier(&self, _: &str) -> StorageResult<Vec<FrontierRecord>> {
            Ok(Vec::new())
        }
        fn clear_target(&mut self, _: &str) -> StorageResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_mark_and_query() {
        let mut store = in_memory_store("t", 10);
        assert!(!store.is_completed("https://example.com/a"));

        assert!(store.mark("https://example.com/a", CompletionStatus::Success));
        assert!(store.is_completed("https://example.com/a"));
        assert_eq!(store.completed_count(), 1);
    }

    #[test]
    fn test_mark_twice_is_noop() {
        let mut store = in_memory_store("t", 10);
        assert!(store.mark("a", CompletionStatus::Success));
        assert!(!store.mark("a", CompletionStatus::Failed));
        assert_eq!(store.pending_count(), 1);
    }

    #[test]
    fn test_flush_due_by_count() {
        let mut store = in_memory_store("t", 2);
        store.mark("a", CompletionStatus::Success);
        assert!(!store.flush_due());
        store.mark("b", CompletionStatus::Success);
        assert!(store.flush_due());

        store.flush();
        assert_eq!(store.pending_count(), 0);
        assert!(!store.flush_due());
        assert_eq!(store.completed_counts().unwrap(), (2, 0));
    }

    #[test]
    fn test_flush_due_by_interval() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let mut store = StateStore::with_storage(
            Box::new(storage),
            "t",
            FlushPolicy {
                every: 100,
                interval: Duration::ZERO,
            },
        )
        .unwrap();

        assert!(!store.flush_due());
        store.mark("a", CompletionStatus::Success);
        assert!(store.flush_due());
    }

    #[test]
    fn test_resume_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let mut store = StateStore::open(&path, "out", policy(100)).unwrap();
            store.mark("https://example.com/list", CompletionStatus::Success);
            store.mark("https://example.com/gone", CompletionStatus::Failed);
            store.flush();
        }

        let store = StateStore::open(&path, "out", policy(100)).unwrap();
        assert!(store.is_completed("https://example.com/list"));
        assert!(store.is_completed("https://example.com/gone"));

        let other = StateStore::open(&path, "other", policy(100)).unwrap();
        assert_eq!(other.completed_count(), 0);
    }

    #[test]
    fn test_drop_flushes_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let mut store = StateStore::open(&path, "out", policy(100)).unwrap();
            store.mark("a", CompletionStatus::Success);
        }

        let store = StateStore::open(&path, "out", policy(100)).unwrap();
        assert!(store.is_completed("a"));
    }

    #[test]
    fn test_degrades_to_memory_only() {
        let mut store =
            StateStore::with_storage(Box::new(BrokenStorage), "t", policy(1)).unwrap();
        assert!(store.is_persistent());

        store.mark("a", CompletionStatus::Success);
        store.flush();

        assert!(!store.is_persistent());
        assert!(store.is_completed("a"));

        // Marks keep working in memory
        assert!(store.mark("b", CompletionStatus::Success));
        assert!(store.is_completed("b"));
        assert_eq!(store.pending_count(), 0);
    }

    #[test]
    fn test_memory_only_store() {
        let mut store = StateStore::memory_only("t");
        assert!(!store.is_persistent());
        assert!(store.begin_run("hash").is_none());
        store.mark("a", CompletionStatus::Success);
        assert!(store.is_completed("a"));
        assert!(store.load_frontier().is_empty());
    }

    #[test]
    fn test_run_bookkeeping() {
        let mut store = in_memory_store("t", 10);
        let run_id = store.begin_run("hash").unwrap();

        let totals = RunTotals {
            items_extracted: 5,
            pages_visited: 2,
            ..Default::default()
        };
        store.finish_run(RunStatus::Completed, &totals);

        let run = store.latest_run().unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.totals.items_extracted, 5);
    }

    #[test]
    fn test_frontier_survives_and_skips_completed() {
        let mut store = in_memory_store("t", 10);
        let seed = WorkUnit::seed("https://example.com/list").unwrap();
        let page2 = WorkUnit::seed("https://example.com/list?page=2").unwrap();
        store.save_frontier(&[seed.clone(), page2.clone()]);

        store.mark(seed.key(), CompletionStatus::Success);

        let restored = store.load_frontier();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].key(), page2.key());
    }

    #[test]
    fn test_clear_forgets_progress() {
        let mut store = in_memory_store("t", 1);
        store.mark("a", CompletionStatus::Success);
        store.flush();
        store.clear();

        assert!(!store.is_completed("a"));
        assert_eq!(store.completed_counts().unwrap(), (0, 0));
    }
}
