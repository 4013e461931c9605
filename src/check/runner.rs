use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::check::sink::{NoopSink, ProgressSink, ProgressSnapshot};
use crate::check::{Category, Checker, IdRange, MismatchReport, ProgressGrid};
use crate::primitives::concurrency::{LockOptions, LockService};
use crate::types::Result;

/// Configuration of one checker run.
#[derive(Clone, Debug)]
pub struct CheckOptions {
    /// Inclusive bounds applied to the work source.
    pub range: IdRange,
    /// Progress grid rows.
    pub rows: usize,
    /// Progress grid columns.
    pub cols: usize,
    /// Worker threads.
    pub workers: usize,
    /// Push a snapshot every time this many more items are processed.
    pub flush_every: u64,
    /// Keep every evidence string in the final summary, not only in sink
    /// snapshots.
    pub retain_evidence: bool,
    /// Retry settings of the aggregate lock.
    pub lock: LockOptions,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            range: IdRange::default(),
            rows: 8,
            cols: 8,
            workers: 4,
            flush_every: 100,
            retain_evidence: true,
            lock: LockOptions::default(),
        }
    }
}

/// Lifecycle of a [`CheckRunner`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Configured, not started.
    Initialized,
    /// Workers are processing items.
    Running,
    /// All items processed and the final snapshot pushed.
    Finalized,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Initialized => "initialized",
            RunState::Running => "running",
            RunState::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// Outcome of a finished run.
#[derive(Clone, Debug)]
pub struct RunSummary<C: Category> {
    /// Checker name.
    pub checker: &'static str,
    /// Items processed, failed ones included.
    pub processed: u64,
    /// Items whose verification returned an error or panicked.
    pub failed: u64,
    /// Findings per category, every category present.
    pub totals: BTreeMap<C, u64>,
    /// Retained evidence (empty when `retain_evidence` is off).
    pub evidence: MismatchReport<C>,
    /// Final progress grid.
    pub grid: ProgressGrid,
    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: f64,
}

impl<C: Category> RunSummary<C> {
    /// Findings recorded under `category`.
    pub fn count(&self, category: C) -> u64 {
        self.totals.get(&category).copied().unwrap_or(0)
    }

    /// Findings across all categories.
    pub fn issues(&self) -> u64 {
        self.totals.values().sum()
    }

    /// Type-erased, serializable form keyed by category tag.
    pub fn to_report(&self) -> CheckReport {
        CheckReport {
            checker: self.checker.to_string(),
            processed: self.processed,
            failed: self.failed,
            issues: self.issues(),
            elapsed_ms: self.elapsed_ms,
            totals: tagged_totals(&self.totals),
            evidence: self.evidence.to_tagged(),
            grid: self.grid.to_rows(),
        }
    }
}

/// Serializable run summary used by the CLI.
#[derive(Clone, Debug, Serialize)]
pub struct CheckReport {
    /// Checker name.
    pub checker: String,
    /// Items processed.
    pub processed: u64,
    /// Items that failed outright.
    pub failed: u64,
    /// Findings across all categories.
    pub issues: u64,
    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: f64,
    /// Findings per category tag.
    pub totals: BTreeMap<String, u64>,
    /// Retained evidence per category tag.
    pub evidence: BTreeMap<String, Vec<String>>,
    /// Progress grid rows.
    pub grid: Vec<Vec<u64>>,
}

struct Aggregate<C: Category> {
    totals: BTreeMap<C, u64>,
    unpushed: MismatchReport<C>,
    retained: MismatchReport<C>,
    retain: bool,
    grid: ProgressGrid,
    processed: u64,
    failed: u64,
    next_flush: u64,
    flush_every: u64,
}

impl<C: Category> Aggregate<C> {
    fn new(opts: &CheckOptions) -> Self {
        let flush_every = opts.flush_every.max(1);
        Self {
            totals: C::ALL.iter().map(|category| (*category, 0)).collect(),
            unpushed: MismatchReport::new(),
            retained: MismatchReport::new(),
            retain: opts.retain_evidence,
            grid: ProgressGrid::new(opts.rows, opts.cols),
            processed: 0,
            failed: 0,
            next_flush: flush_every,
            flush_every,
        }
    }

    /// Folds a worker delta in; returns a snapshot when a flush boundary was
    /// crossed.
    fn apply(&mut self, delta: &mut Delta<C>, checker: &str) -> Option<ProgressSnapshot> {
        for index in delta.indices.drain(..) {
            self.grid.increment(index);
        }
        self.processed += delta.processed;
        self.failed += delta.failed;
        delta.processed = 0;
        delta.failed = 0;

        let report = delta.report.take();
        for (category, evidence) in report.iter() {
            *self.totals.entry(category).or_insert(0) += evidence.len() as u64;
        }
        if self.retain {
            self.retained.merge(report.clone());
        }
        self.unpushed.merge(report);

        if self.processed < self.next_flush {
            return None;
        }
        self.next_flush = (self.processed / self.flush_every + 1) * self.flush_every;
        Some(self.snapshot(checker, false))
    }

    /// Builds a snapshot and forgets the evidence it carries.
    fn snapshot(&mut self, checker: &str, final_flush: bool) -> ProgressSnapshot {
        ProgressSnapshot {
            checker: checker.to_string(),
            processed: self.processed,
            failed: self.failed,
            final_flush,
            grid: self.grid.to_rows(),
            category_totals: tagged_totals(&self.totals),
            evidence: self.unpushed.take().to_tagged(),
        }
    }
}

/// Work a worker has finished but not yet merged into the aggregate.
struct Delta<C: Category> {
    report: MismatchReport<C>,
    indices: Vec<usize>,
    processed: u64,
    failed: u64,
}

impl<C: Category> Delta<C> {
    fn new() -> Self {
        Self {
            report: MismatchReport::new(),
            indices: Vec::new(),
            processed: 0,
            failed: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.processed == 0 && self.report.is_empty()
    }
}

/// Runs a [`Checker`] over its work source with a fixed worker pool.
pub struct CheckRunner<K: Checker> {
    checker: K,
    opts: CheckOptions,
    sink: Arc<dyn ProgressSink>,
    state: RunState,
}

impl<K: Checker> CheckRunner<K> {
    /// Runner with a [`NoopSink`].
    pub fn new(checker: K, opts: CheckOptions) -> Self {
        Self {
            checker,
            opts,
            sink: Arc::new(NoopSink),
            state: RunState::Initialized,
        }
    }

    /// Replaces the progress sink.
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// The wrapped checker.
    pub fn checker(&self) -> &K {
        &self.checker
    }

    /// Processes every item and returns the aggregated summary.
    ///
    /// Item failures are recorded, never returned.
    ///
    /// # Errors
    ///
    /// Fails only when the work source cannot be opened.
    pub fn run(&mut self) -> Result<RunSummary<K::Category>> {
        let name = self.checker.name();
        let started = Instant::now();
        let source = self.checker.items(self.opts.range)?;
        advance(name, &mut self.state, RunState::Running);

        let workers = self.opts.workers.max(1);
        let source = Mutex::new(source.enumerate());
        let aggregate = LockService::new(
            "check.aggregate",
            Aggregate::<K::Category>::new(&self.opts),
            self.opts.lock,
        );
        let checker = &self.checker;
        let sink = self.sink.as_ref();

        thread::scope(|scope| {
            for worker in 0..workers {
                let source = &source;
                let aggregate = &aggregate;
                scope.spawn(move || {
                    debug!(checker = name, worker, "check.worker.started");
                    let processed = run_worker(checker, source, aggregate, sink);
                    debug!(checker = name, worker, processed, "check.worker.finished");
                });
            }
        });

        let mut aggregate = aggregate.into_inner();
        let last = aggregate.snapshot(name, true);
        push_snapshot(sink, &last);

        let summary = RunSummary {
            checker: name,
            processed: aggregate.processed,
            failed: aggregate.failed,
            totals: aggregate.totals,
            evidence: aggregate.retained,
            grid: aggregate.grid,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        advance(name, &mut self.state, RunState::Finalized);
        info!(
            checker = name,
            processed = summary.processed,
            failed = summary.failed,
            issues = summary.issues(),
            elapsed_ms = summary.elapsed_ms,
            "check.run.finalized"
        );
        Ok(summary)
    }
}

fn advance(checker: &str, state: &mut RunState, next: RunState) {
    debug!(checker, from = %state, to = %next, "check.run.state");
    *state = next;
}

type SharedSource<'a, T> = Mutex<std::iter::Enumerate<crate::check::WorkSource<'a, T>>>;

fn run_worker<K: Checker>(
    checker: &K,
    source: &SharedSource<'_, K::Item>,
    aggregate: &LockService<Aggregate<K::Category>>,
    sink: &dyn ProgressSink,
) -> u64 {
    let name = checker.name();
    let mut delta = Delta::new();
    let mut handled = 0;
    loop {
        let next = source.lock().next();
        let Some((index, item)) = next else {
            break;
        };
        process_item(checker, index, &item, &mut delta);
        handled += 1;

        match aggregate.acquire() {
            Ok(mut agg) => {
                let snapshot = agg.apply(&mut delta, name);
                drop(agg);
                if let Some(snapshot) = snapshot {
                    push_snapshot(sink, &snapshot);
                }
            }
            Err(err) => {
                debug!(
                    checker = name,
                    pending = delta.processed,
                    error = %err,
                    "check.aggregate.deferred"
                );
            }
        }
    }

    // Whatever is left must land before the worker exits.
    while !delta.is_empty() {
        if let Ok(mut agg) = aggregate.acquire() {
            let snapshot = agg.apply(&mut delta, name);
            drop(agg);
            if let Some(snapshot) = snapshot {
                push_snapshot(sink, &snapshot);
            }
        }
    }
    handled
}

fn process_item<K: Checker>(
    checker: &K,
    index: usize,
    item: &K::Item,
    delta: &mut Delta<K::Category>,
) {
    let outcome = catch_unwind(AssertUnwindSafe(|| checker.check_item(item)));
    delta.indices.push(index);
    delta.processed += 1;
    let failure = match outcome {
        Ok(Ok(report)) => {
            delta.report.merge(report);
            return;
        }
        Ok(Err(err)) => err.to_string(),
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
    };
    delta.failed += 1;
    warn!(checker = checker.name(), item = %item, index, error = %failure, "check.item.failed");
    if let Some(bucket) = K::Category::error_bucket() {
        delta.report.push(bucket, format!("{item}: {failure}"));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn push_snapshot(sink: &dyn ProgressSink, snapshot: &ProgressSnapshot) {
    if let Err(err) = sink.push(snapshot) {
        warn!(
            checker = %snapshot.checker,
            processed = snapshot.processed,
            error = %err,
            "check.sink.failed"
        );
    }
}

fn tagged_totals<C: Category>(totals: &BTreeMap<C, u64>) -> BTreeMap<String, u64> {
    totals
        .iter()
        .map(|(category, count)| (category.tag().to_string(), *count))
        .collect()
}
