//! Worker-pool orchestration for one run.
//!
//! ```text
//! Init -> Probing -> Dispatching -> Running -> Draining -> Reporting -> Done
//! ```
//!
//! Probing fetches the first page to learn the collection size. The rest of
//! the window is partitioned into pages and loaded into a shared queue once.
//! A fixed set of worker tasks drains the queue; when it is empty or the run
//! is cancelled the orchestrator joins every worker and builds the report
//! from whatever was recorded.

use std::collections::VecDeque;
use std::fmt;
use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tally_source::{CancelFlag, Fetched, PageError, PageFetcher, PageSource};
use tally_summary::CategoryAggregator;
use tally_types::{Page, partition};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{RunConfig, RunReport};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Init,
    Probing,
    Dispatching,
    Running,
    Draining,
    Reporting,
    Done,
}

impl RunPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunPhase::Init => "init",
            RunPhase::Probing => "probing",
            RunPhase::Dispatching => "dispatching",
            RunPhase::Running => "running",
            RunPhase::Draining => "draining",
            RunPhase::Reporting => "reporting",
            RunPhase::Done => "done",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run accounting. Owned by the orchestrator; workers report into it only
/// when joined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunState {
    pub phase: RunPhase,
    /// Items in the fetch window, as determined while probing.
    pub total_items: u64,
    pub pages_dispatched: u64,
    pub pages_completed: u64,
    pub pages_failed: u64,
    pub items_recorded: u64,
    /// Stopped before every planned page was fetched.
    pub cancelled: bool,
}

/// Failures that prevent a run from producing any report.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("probe request failed")]
    Probe(#[source] PageError),
    #[error("collection size unknown: the API reported no total and no max_offset is configured")]
    UnknownTotal,
}

/// Counters one worker accumulates and hands back when joined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub pages_dispatched: u64,
    pub pages_completed: u64,
    pub pages_failed: u64,
    pub items_recorded: u64,
}

impl RunState {
    fn absorb(&mut self, stats: WorkerStats) {
        self.pages_dispatched += stats.pages_dispatched;
        self.pages_completed += stats.pages_completed;
        self.pages_failed += stats.pages_failed;
        self.items_recorded += stats.items_recorded;
    }
}

/// Pages waiting for a worker. Loaded once, then only popped.
#[derive(Debug, Default)]
struct PageQueue {
    pages: Mutex<VecDeque<Page>>,
    emptied: Notify,
}

impl PageQueue {
    fn new(pages: impl IntoIterator<Item = Page>) -> Self {
        Self {
            pages: Mutex::new(pages.into_iter().collect()),
            emptied: Notify::new(),
        }
    }

    fn pop(&self) -> Option<Page> {
        let mut pages = self.pages.lock().unwrap_or_else(PoisonError::into_inner);
        let page = pages.pop_front();
        let now_empty = pages.is_empty();
        drop(pages);
        if now_empty {
            self.emptied.notify_waiters();
        }
        page
    }

    fn is_empty(&self) -> bool {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Resolves once every page has been handed out.
    async fn drained(&self) {
        loop {
            let notified = self.emptied.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

/// Fetch window settings taken from [`RunConfig`].
#[derive(Debug, Clone, Copy)]
struct Window {
    limit: NonZeroU32,
    min_offset: u64,
    max_offset: Option<u64>,
}

impl Window {
    /// Number of items to fetch, given the total the API reported (if any).
    ///
    /// The API total is an exclusive end offset; `max_offset` is an inclusive
    /// one. When both exist the smaller range wins.
    fn items(&self, reported: Option<u64>) -> Option<u64> {
        let configured = self.max_offset.map(|max| max.saturating_add(1));
        let end = match (reported, configured) {
            (Some(reported), Some(configured)) => Some(reported.min(configured)),
            (reported, configured) => reported.or(configured),
        }?;
        Some(end.saturating_sub(self.min_offset))
    }
}

/// Runs the probe, the worker pool and the final report for one collection.
pub struct Orchestrator<S> {
    window: Window,
    workers: NonZeroUsize,
    fetcher: Arc<PageFetcher<S>>,
    aggregator: Arc<CategoryAggregator>,
    cancel: CancelFlag,
    state: RunState,
}

impl<S: PageSource> Orchestrator<S> {
    pub fn new(source: S, config: &RunConfig) -> Self {
        let cancel = CancelFlag::new();
        Self {
            window: Window {
                limit: config.limit,
                min_offset: config.min_offset,
                max_offset: config.max_offset,
            },
            workers: config.workers,
            fetcher: Arc::new(PageFetcher::new(
                source,
                config.retry.clone(),
                cancel.clone(),
            )),
            aggregator: Arc::new(CategoryAggregator::new(config.aggregator)),
            cancel,
            state: RunState::default(),
        }
    }

    /// Handle for stopping the run from outside, e.g. a Ctrl-C listener.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub async fn run(mut self) -> Result<RunReport, RunError> {
        let started = Instant::now();

        let Some(remaining) = self.probe().await? else {
            self.state.cancelled = true;
            return Ok(self.finish(started));
        };

        self.enter(RunPhase::Dispatching);
        let pages: Vec<Page> = partition(remaining, self.window.limit).collect();
        let planned = pages.len() as u64 + 1;
        info!(pages = pages.len(), "Pages queued");
        let queue = Arc::new(PageQueue::new(pages));

        self.enter(RunPhase::Running);
        let mut workers = JoinSet::new();
        for worker in 0..self.workers.get() {
            workers.spawn(run_worker(
                worker,
                Arc::clone(&queue),
                Arc::clone(&self.fetcher),
                Arc::clone(&self.aggregator),
            ));
        }

        let cancel = self.cancel.clone();
        loop {
            if workers.is_empty() {
                break;
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = queue.drained() => break,
                Some(joined) = workers.join_next() => self.join(joined),
            }
        }

        self.enter(RunPhase::Draining);
        while let Some(joined) = workers.join_next().await {
            self.join(joined);
        }

        self.state.cancelled = self.cancel.is_cancelled()
            && self.state.pages_completed + self.state.pages_failed < planned;

        Ok(self.finish(started))
    }

    fn finish(mut self, started: Instant) -> RunReport {
        self.enter(RunPhase::Reporting);
        let aggregate = self.aggregator.report();
        self.enter(RunPhase::Done);

        info!(
            pages_completed = self.state.pages_completed,
            pages_failed = self.state.pages_failed,
            items_recorded = self.state.items_recorded,
            cancelled = self.state.cancelled,
            "Run finished"
        );
        RunReport::new(aggregate, self.state, started.elapsed())
    }

    /// Fetches the first page, records it and returns the offsets still to fetch.
    ///
    /// `None` means the run was cancelled before the first page arrived.
    async fn probe(&mut self) -> Result<Option<std::ops::Range<u64>>, RunError> {
        self.enter(RunPhase::Probing);
        let limit = u64::from(self.window.limit.get());
        let page = Page::new(self.window.min_offset, self.window.limit);
        self.state.pages_dispatched += 1;

        let mut body = match self.fetcher.fetch(page).await {
            Ok(Fetched::Page(body)) => body,
            Ok(Fetched::Cancelled) => {
                warn!("Run cancelled while probing");
                self.state.total_items = self.window.items(None).unwrap_or(0);
                return Ok(None);
            }
            Err(err) => {
                error!(%err, "Probe failed");
                return Err(RunError::Probe(err));
            }
        };

        let Some(total) = self.window.items(body.total) else {
            error!("Collection size unknown");
            return Err(RunError::UnknownTotal);
        };
        self.state.total_items = total;

        let in_window = usize::try_from(total.min(limit)).unwrap_or(usize::MAX);
        body.items.truncate(in_window);
        self.state.pages_completed += 1;
        self.state.items_recorded += self.aggregator.record_batch(&body.items) as u64;
        info!(total_items = total, "Collection size determined");

        let start = self.window.min_offset;
        let end = start.saturating_add(total);
        Ok(Some(start.saturating_add(limit).min(end)..end))
    }

    fn join(&mut self, joined: Result<WorkerStats, JoinError>) {
        match joined {
            Ok(stats) => self.state.absorb(stats),
            Err(err) => error!(%err, "Worker task failed"),
        }
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!(from = %self.state.phase, to = %phase, "Phase transition");
        self.state.phase = phase;
        info!(phase = %phase, "Run phase");
    }
}

async fn run_worker<S: PageSource>(
    worker: usize,
    queue: Arc<PageQueue>,
    fetcher: Arc<PageFetcher<S>>,
    aggregator: Arc<CategoryAggregator>,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    loop {
        if fetcher.cancel_flag().is_cancelled() {
            break;
        }
        let Some(page) = queue.pop() else {
            break;
        };
        stats.pages_dispatched += 1;

        match fetcher.fetch(page).await {
            Ok(Fetched::Page(mut body)) => {
                body.items.truncate(usize::try_from(page.limit()).unwrap_or(usize::MAX));
                stats.items_recorded += aggregator.record_batch(&body.items) as u64;
                stats.pages_completed += 1;
            }
            Ok(Fetched::Cancelled) => break,
            Err(err) => {
                warn!(
                    worker,
                    offset = page.offset(),
                    limit = page.limit(),
                    %err,
                    "Skipping page"
                );
                stats.pages_failed += 1;
            }
        }
    }
    debug!(worker, ?stats, "Worker finished");
    stats
}
