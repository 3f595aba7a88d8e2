//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl loop that coordinates:
//! - Seeding the frontier, skipping units a prior run completed
//! - Dispatching units to workers at bounded concurrency
//! - Fetching through the middleware chain, then extracting and paginating
//! - Dropping records already emitted earlier in the run
//! - Marking finished units (failed ones included) in the state store
//! - Honouring the item and page ceilings and external cancellation
//!
//! Each unit moves through `PENDING -> IN_FLIGHT -> {EXTRACTED -> COMPLETE} | FAILED`.
//! A retry signal sends it back to `PENDING` with a backoff.

use crate::config::CrawlerConfig;
use crate::crawler::paginator::Paginator;
use crate::crawler::scheduler::{Frontier, QueuedUnit, Ready};
use crate::crawler::{FetchError, RenderedPage, Renderer};
use crate::extract::{Extractor, HtmlDocument};
use crate::middleware::{FetchRequest, MiddlewareChain, Verdict};
use crate::output::{CrawlSummary, OutputBuffer, RecordPipeline, StopReason};
use crate::state::{UnitState, WorkUnit};
use crate::storage::{CompletionStatus, RunStatus, StateStore};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pages between progress log lines
const PROGRESS_EVERY: u64 = 10;

/// Longest the dispatcher sleeps without re-checking the frontier
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Knobs of a single run
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Hard ceiling on units in flight
    pub concurrency: usize,
    pub max_items: Option<usize>,
    pub max_pages: Option<u32>,
    pub request_timeout: Duration,
    /// How long in-flight units may finish once dispatch stops
    pub drain_timeout: Duration,
}

impl CrawlOptions {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1) as usize,
            max_items: config.max_items,
            max_pages: config.max_pages,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            drain_timeout: Duration::from_secs(config.drain_timeout_secs),
        }
    }
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}

/// Outcome of offering a unit to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Queued,
    Duplicate,
    /// A prior run completed it
    AlreadyCompleted,
}

/// Run-wide counters, guarded together with the frontier
#[derive(Debug, Default)]
struct Progress {
    frontier: Frontier,
    pages_visited: u64,
    units_failed: u64,
    skipped_via_resume: u64,
    duplicate_records: u64,
}

/// What the dispatcher should do next
enum Step {
    Dispatch(QueuedUnit),
    Wait(Option<Instant>),
    Stop(StopReason),
}

/// Everything a worker needs, shared across the pool
struct Crawl {
    renderer: Arc<dyn Renderer>,
    chain: MiddlewareChain,
    extractor: Extractor,
    paginator: Paginator,
    pipeline: RecordPipeline,
    state: Arc<Mutex<StateStore>>,
    output: Arc<OutputBuffer>,
    progress: Mutex<Progress>,
    max_pages: Option<u64>,
    request_timeout: Duration,
    started: Instant,
}

/// Main crawler coordinator structure
///
/// A coordinator runs once: configure it, grab its [`OutputBuffer`] and
/// cancellation token, then call [`Coordinator::run`].
pub struct Coordinator {
    renderer: Arc<dyn Renderer>,
    chain: MiddlewareChain,
    extractor: Extractor,
    paginator: Paginator,
    state: Arc<Mutex<StateStore>>,
    output: Arc<OutputBuffer>,
    options: CrawlOptions,
    cancel: CancellationToken,
    config_hash: String,
}

impl Coordinator {
    /// Creates a coordinator with an empty middleware chain, no pagination
    /// and a memory-only state store
    pub fn new(renderer: Arc<dyn Renderer>, extractor: Extractor, options: CrawlOptions) -> Self {
        Self {
            renderer,
            chain: MiddlewareChain::new(),
            extractor,
            paginator: Paginator::default(),
            state: Arc::new(Mutex::new(StateStore::memory_only("default"))),
            output: Arc::new(OutputBuffer::new(options.max_items)),
            options,
            cancel: CancellationToken::new(),
            config_hash: String::new(),
        }
    }

    pub fn with_chain(mut self, chain: MiddlewareChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_paginator(mut self, paginator: Paginator) -> Self {
        self.paginator = paginator;
        self
    }

    pub fn with_state(mut self, state: Arc<Mutex<StateStore>>) -> Self {
        self.state = state;
        self
    }

    /// Hash of the settings recorded on the run row
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    /// Token that stops dispatch when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Buffer the run's records land in
    pub fn output(&self) -> Arc<OutputBuffer> {
        Arc::clone(&self.output)
    }

    /// Runs the crawl from `seeds` until the frontier drains, a ceiling is
    /// hit or the run is cancelled
    ///
    /// Units left in the frontier from an interrupted earlier run are
    /// queued after the seeds. Per-unit failures never abort the run.
    pub async fn run(self, seeds: Vec<WorkUnit>) -> CrawlSummary {
        let max_pages = match (self.options.max_pages, self.paginator.max_pages()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let crawl = Arc::new(Crawl {
            renderer: self.renderer,
            chain: self.chain,
            extractor: self.extractor,
            paginator: self.paginator,
            pipeline: RecordPipeline::new(),
            state: self.state,
            output: self.output,
            progress: Mutex::new(Progress::default()),
            max_pages: max_pages.map(u64::from),
            request_timeout: self.options.request_timeout,
            started: Instant::now(),
        });

        let restored = {
            let mut state = crawl.lock_state();
            if let Some(run_id) = state.begin_run(&self.config_hash) {
                info!("Starting crawl run {}", run_id);
            }
            state.load_frontier()
        };
        if !restored.is_empty() {
            info!("Resuming {} unit(s) from the stored frontier", restored.len());
        }

        for unit in seeds.into_iter().chain(restored) {
            match crawl.admit(unit.clone()) {
                Admission::Queued => debug!("Queued {}", unit.url()),
                Admission::Duplicate => debug!("Skipping duplicate {}", unit.url()),
                Admission::AlreadyCompleted => {
                    info!("Skipping {}: completed in an earlier run", unit.url())
                }
            }
        }

        let mut tasks = JoinSet::new();
        let stop_reason = dispatch(&crawl, &mut tasks, self.options.concurrency, &self.cancel).await;
        info!("Dispatch stopped: {}", stop_reason);

        drain(&mut tasks, self.options.drain_timeout).await;
        crawl.finalize(stop_reason)
    }
}

/// Hands units to workers until the crawl should stop
async fn dispatch(
    crawl: &Arc<Crawl>,
    tasks: &mut JoinSet<()>,
    concurrency: usize,
    cancel: &CancellationToken,
) -> StopReason {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    loop {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StopReason::Cancelled,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return StopReason::Cancelled,
            },
        };

        match crawl.next_step() {
            Step::Dispatch(entry) => {
                reap(tasks);
                tasks.spawn(process(Arc::clone(crawl), entry, permit));
            }
            Step::Wait(until) => {
                drop(permit);
                let deadline = until.unwrap_or_else(|| Instant::now() + IDLE_POLL);
                tokio::select! {
                    Some(joined) = tasks.join_next() => log_join(joined),
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = cancel.cancelled() => {}
                }
            }
            Step::Stop(reason) => return reason,
        }
    }
}

/// Lets in-flight units finish, abandoning them after `timeout`
///
/// Abandoned units stay unmarked and remain in the stored frontier.
async fn drain(tasks: &mut JoinSet<()>, timeout: Duration) {
    if tasks.is_empty() {
        return;
    }

    let finished = tokio::time::timeout(timeout, async {
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
    })
    .await;

    if finished.is_err() {
        warn!(
            "{} unit(s) still in flight after {:?}; abandoning them",
            tasks.len(),
            timeout
        );
        tasks.shutdown().await;
    }
}

/// Collects workers that already finished, without waiting
fn reap(tasks: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(joined) = tasks.try_join_next() {
        log_join(joined);
        reaped += 1;
    }
    reaped
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("Worker panicked: {}", e);
        }
    }
}

/// One fetch -> extract -> enqueue cycle
async fn process(crawl: Arc<Crawl>, entry: QueuedUnit, _permit: OwnedSemaphorePermit) {
    let QueuedUnit { unit, attempt, .. } = entry;

    let request = FetchRequest::new(unit.url().clone(), crawl.request_timeout, attempt);
    let request = crawl.chain.before_request(request).await;

    debug!("Fetching {} (attempt {})", request.url, attempt);
    let outcome = crawl.renderer.fetch(&request).await;

    match crawl.chain.after_response(&request, outcome).await {
        Verdict::Retry { after, reason } => {
            info!(
                "Retrying {} in {:?} (attempt {} failed: {})",
                unit.url(),
                after,
                attempt,
                reason
            );
            crawl
                .lock_progress()
                .frontier
                .requeue(unit, attempt + 1, Instant::now() + after);
        }
        Verdict::Continue(Err(e)) => crawl.fail(&unit, &e),
        Verdict::Continue(Ok(page)) => crawl.complete(&unit, page),
    }
}

impl Crawl {
    fn lock_progress(&self) -> MutexGuard<'_, Progress> {
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_state(&self) -> MutexGuard<'_, StateStore> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Offers a unit to the frontier
    ///
    /// The seen set and the completed set are checked under one lock, so a
    /// unit is queued at most once per run.
    fn admit(&self, unit: WorkUnit) -> Admission {
        let mut progress = self.lock_progress();
        if progress.frontier.has_seen(unit.key()) {
            return Admission::Duplicate;
        }

        if self.lock_state().is_completed(unit.key()) {
            progress.frontier.mark_seen(unit.key());
            progress.skipped_via_resume += 1;
            return Admission::AlreadyCompleted;
        }

        progress.frontier.push(unit);
        Admission::Queued
    }

    /// Decides the dispatcher's next move
    fn next_step(&self) -> Step {
        if self.output.is_full() {
            return Step::Stop(StopReason::MaxItems);
        }

        let mut progress = self.lock_progress();

        if let Some(max) = self.max_pages {
            let in_flight = progress.frontier.in_flight() as u64;
            if progress.pages_visited >= max {
                return if progress.frontier.is_drained() {
                    Step::Stop(StopReason::Drained)
                } else {
                    Step::Stop(StopReason::MaxPages)
                };
            }
            // Every in-flight unit may still become a visited page
            if progress.pages_visited + in_flight >= max {
                return Step::Wait(None);
            }
        }

        match progress.frontier.pop_ready(Instant::now()) {
            Ready::Unit(entry) => Step::Dispatch(entry),
            Ready::WaitUntil(at) => Step::Wait(Some(at)),
            Ready::Empty if progress.frontier.in_flight() == 0 => Step::Stop(StopReason::Drained),
            Ready::Empty => Step::Wait(None),
        }
    }

    /// Handles a fetched page
    fn complete(&self, unit: &WorkUnit, page: RenderedPage) {
        // The parsed tree is not Send; it must not outlive this block
        let (extraction, next) = {
            let doc = HtmlDocument::parse(&page.html).with_base_url(page.final_url.clone());
            (
                self.extractor.extract_detailed(&doc),
                self.paginator.next(&doc, unit),
            )
        };

        let (pages_visited, queued) = {
            let mut progress = self.lock_progress();
            progress.pages_visited += 1;
            progress.frontier.mark_extracted(unit.key());
            (progress.pages_visited, progress.frontier.queued())
        };

        let produced = extraction.records.len();
        let processed = self.pipeline.process(extraction.records);
        if processed.duplicates > 0 {
            self.lock_progress().duplicate_records += processed.duplicates as u64;
        }
        let accepted = self.output.append(processed.records);
        debug!(
            "{}: {} record(s) via {:?}, {} duplicate, {} accepted",
            unit.url(),
            produced,
            extraction.method,
            processed.duplicates,
            accepted
        );

        if let Some(next) = next {
            self.follow(next, pages_visited);
        }

        self.retire(unit, UnitState::Complete, CompletionStatus::Success);

        if pages_visited % PROGRESS_EVERY == 0 {
            let elapsed = self.started.elapsed().as_secs_f64();
            info!(
                "Progress: {} pages visited, {} items, {} queued, {:.2} pages/sec",
                pages_visited,
                self.output.len(),
                queued,
                pages_visited as f64 / elapsed.max(f64::EPSILON)
            );
        }
    }

    /// Enqueues a pagination target unless a ceiling forbids it
    fn follow(&self, next: WorkUnit, pages_visited: u64) {
        if self.output.is_full() {
            debug!("Item ceiling reached; not following {}", next.url());
            return;
        }
        if self.max_pages.map_or(false, |max| pages_visited >= max) {
            debug!("Page ceiling reached; not following {}", next.url());
            return;
        }

        match self.admit(next.clone()) {
            Admission::Queued => debug!("Discovered {} (depth {})", next.url(), next.depth()),
            Admission::Duplicate => debug!("Already queued or visited: {}", next.url()),
            Admission::AlreadyCompleted => {
                debug!("Skipping {}: completed in an earlier run", next.url())
            }
        }
    }

    fn fail(&self, unit: &WorkUnit, error: &FetchError) {
        warn!("Failed {}: {}", unit.url(), error);
        self.lock_progress().units_failed += 1;
        self.retire(unit, UnitState::Failed, CompletionStatus::Failed);
    }

    /// Retires a unit and marks it completed, flushing on the store's cadence
    fn retire(&self, unit: &WorkUnit, outcome: UnitState, status: CompletionStatus) {
        self.lock_progress().frontier.finish(unit.key(), outcome);

        let flush_due = {
            let mut state = self.lock_state();
            state.mark(unit.key(), status);
            state.flush_due()
        };

        if flush_due {
            let outstanding = self.lock_progress().frontier.outstanding();
            let mut state = self.lock_state();
            state.save_frontier(&outstanding);
            state.flush();
        }
    }

    /// Closes the output, persists what is left and builds the summary
    fn finalize(&self, stop_reason: StopReason) -> CrawlSummary {
        self.output.close();

        let (outstanding, summary) = {
            let progress = self.lock_progress();
            let summary = CrawlSummary {
                items_extracted: self.output.len() as u64,
                pages_visited: progress.pages_visited,
                units_failed: progress.units_failed,
                units_skipped_via_resume: progress.skipped_via_resume,
                records_dropped: self.output.dropped() as u64,
                duplicate_records: progress.duplicate_records,
                stop_reason,
                elapsed: self.started.elapsed(),
            };
            (progress.frontier.outstanding(), summary)
        };

        let status = match stop_reason {
            StopReason::Cancelled => RunStatus::Interrupted,
            _ if summary.is_total_failure() && summary.pages_visited + summary.units_failed > 0 => {
                RunStatus::Failed
            }
            _ => RunStatus::Completed,
        };

        {
            let mut state = self.lock_state();
            state.save_frontier(&outstanding);
            state.flush();
            state.finish_run(status, &summary.totals());
        }

        if !outstanding.is_empty() {
            info!("{} unit(s) left for a later run", outstanding.len());
        }
        info!(
            "Crawl finished ({}): {} items, {} pages, {} failed, {} skipped via resume in {:?}",
            stop_reason,
            summary.items_extracted,
            summary.pages_visited,
            summary.units_failed,
            summary.units_skipped_via_resume,
            summary.elapsed
        );

        summary
    }
}
