//! Shared per-query state: the search term, the validity flag, the
//! growing result sequence, and per-handler timing.
//!
//! Exactly one query execution owns a context for its lifetime.
//! Handlers receive only `&QueryContext`, a read/append capability.
//! Appends are serialized by a single mutex; the validity flag is a
//! lock-free atomic that handlers poll for cooperative cancellation.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::ranking::RelevanceRanker;
use crate::types::{ExecutionClass, HandlerRuntime, ResultItem};

/// Monotonic change counter published to the execution's emitter task.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Revision {
    pub(crate) seq: u64,
}

/// The published result sequence, split into the ranked region and the
/// arrival-ordered tail. `staged` holds in-window batch items that are
/// not yet published (non-incremental mode only).
#[derive(Default)]
struct ResultRegions {
    ranked: Vec<ResultItem>,
    staged: Vec<ResultItem>,
    tail: Vec<ResultItem>,
    sealed: bool,
}

/// Per-query mutable state shared with all dispatched handlers.
pub struct QueryContext {
    term: String,
    valid: AtomicBool,
    finished: AtomicBool,
    sealed: AtomicBool,
    pending_urgent: AtomicBool,
    started: Instant,
    sort_window: Duration,
    incremental_sort: bool,
    dispatched: HashMap<String, ExecutionClass>,
    ranker: Arc<RelevanceRanker>,
    results: Mutex<ResultRegions>,
    runtimes: Mutex<HashMap<String, u64>>,
    changes: watch::Sender<Revision>,
}

impl QueryContext {
    pub(crate) fn new(
        term: String,
        dispatched: HashMap<String, ExecutionClass>,
        ranker: Arc<RelevanceRanker>,
        incremental_sort: bool,
        sort_window: Duration,
    ) -> Self {
        let (changes, _) = watch::channel(Revision::default());
        Self {
            term,
            valid: AtomicBool::new(true),
            finished: AtomicBool::new(false),
            sealed: AtomicBool::new(false),
            pending_urgent: AtomicBool::new(false),
            started: Instant::now(),
            sort_window,
            incremental_sort,
            dispatched,
            ranker,
            results: Mutex::new(ResultRegions::default()),
            runtimes: Mutex::new(HashMap::new()),
            changes,
        }
    }

    /// The search term this query was started with.
    pub fn term(&self) -> &str {
        &self.term
    }

    /// Whether this query is still current. Flips to `false` exactly
    /// once, on supersession, and never reverses. Handlers doing
    /// long-running work must poll this and abort promptly once it
    /// turns false; the scheduler never interrupts handler code.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Invalidates the query. Level-triggered and idempotent: only the
    /// first call has any effect.
    pub(crate) fn cancel(&self) {
        if self.valid.swap(false, Ordering::AcqRel) {
            self.bump(true);
        }
    }

    /// Appends a result item.
    ///
    /// Batch items arriving inside the sort window join the ranked
    /// region (inserted at their ranked position in incremental mode,
    /// staged for one sort at the presentation boundary otherwise).
    /// Later batch items and all Realtime items are appended to the
    /// tail in arrival order.
    ///
    /// An item naming a handler outside this execution's dispatched
    /// set is dropped with a diagnostic. Items appended after the
    /// query was invalidated are dropped silently.
    pub fn add_item(&self, item: ResultItem) {
        let Some(&class) = self.dispatched.get(&item.handler_id) else {
            tracing::warn!(
                handler = %item.handler_id,
                "dropping item from handler outside the dispatched set"
            );
            return;
        };
        if !self.is_valid() {
            return;
        }

        // The window may have lapsed without the boundary timer having
        // fired yet; seal before routing so the item lands in the tail.
        if class == ExecutionClass::Batch
            && !self.boundary_sealed()
            && self.started.elapsed() >= self.sort_window
        {
            self.seal_boundary();
        }

        let mut regions = self.results.lock().unwrap_or_else(|e| e.into_inner());
        match class {
            ExecutionClass::Realtime => {
                regions.tail.push(item);
                drop(regions);
                self.bump(false);
            }
            ExecutionClass::Batch if regions.sealed => {
                regions.tail.push(item);
                drop(regions);
                self.bump(false);
            }
            ExecutionClass::Batch if self.incremental_sort => {
                let pos = regions
                    .ranked
                    .partition_point(|existing| {
                        self.ranker.compare(existing, &item) != CmpOrdering::Greater
                    });
                regions.ranked.insert(pos, item);
                drop(regions);
                self.bump(false);
            }
            ExecutionClass::Batch => {
                // Held back until the boundary seals; no notification.
                regions.staged.push(item);
            }
        }
    }

    /// Seals the batch sort boundary: staged items are sorted by the
    /// relevance comparator and published into the ranked region.
    /// Idempotent; the first of {window timer, all Batch handlers
    /// finished} wins.
    pub(crate) fn seal_boundary(&self) {
        let mut regions = self.results.lock().unwrap_or_else(|e| e.into_inner());
        if regions.sealed {
            return;
        }
        regions.sealed = true;
        self.sealed.store(true, Ordering::Release);
        if regions.staged.is_empty() {
            return;
        }
        let mut staged = std::mem::take(&mut regions.staged);
        staged.sort_by(|a, b| self.ranker.compare(a, b));
        regions.ranked.extend(staged);
        drop(regions);
        self.bump(true);
    }

    /// Whether the batch sort boundary has sealed.
    pub(crate) fn boundary_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Marks the execution complete: every dispatched handler returned.
    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
        self.bump(true);
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// The current published result sequence: ranked region first,
    /// then the arrival-ordered tail. Staged items are excluded until
    /// the boundary seals.
    pub fn snapshot(&self) -> Vec<ResultItem> {
        let regions = self.results.lock().unwrap_or_else(|e| e.into_inner());
        regions
            .ranked
            .iter()
            .chain(regions.tail.iter())
            .cloned()
            .collect()
    }

    /// Number of currently published items.
    pub fn published(&self) -> usize {
        let regions = self.results.lock().unwrap_or_else(|e| e.into_inner());
        regions.ranked.len() + regions.tail.len()
    }

    /// Records the elapsed time of one handler invocation.
    pub(crate) fn record_runtime(&self, handler_id: &str, elapsed_micros: u64) {
        self.runtimes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(handler_id.to_string(), elapsed_micros);
    }

    /// Per-handler runtime records accumulated by this query, sorted
    /// by handler id for determinism.
    pub fn runtimes(&self) -> Vec<HandlerRuntime> {
        let table = self.runtimes.lock().unwrap_or_else(|e| e.into_inner());
        let mut records: Vec<HandlerRuntime> = table
            .iter()
            .map(|(handler_id, &elapsed_micros)| HandlerRuntime {
                handler_id: handler_id.clone(),
                elapsed_micros,
            })
            .collect();
        records.sort_by(|a, b| a.handler_id.cmp(&b.handler_id));
        records
    }

    pub(crate) fn started_at(&self) -> Instant {
        self.started
    }

    pub(crate) fn sort_window(&self) -> Duration {
        self.sort_window
    }

    pub(crate) fn subscribe_changes(&self) -> watch::Receiver<Revision> {
        self.changes.subscribe()
    }

    /// Consumes the pending-urgent flag. Urgent changes (boundary
    /// publication, completion, cancellation) bypass the emitter's
    /// coalescing throttle.
    pub(crate) fn take_urgent(&self) -> bool {
        self.pending_urgent.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn urgent_pending(&self) -> bool {
        self.pending_urgent.load(Ordering::Acquire)
    }

    fn bump(&self, urgent: bool) {
        if urgent {
            self.pending_urgent.store(true, Ordering::Release);
        }
        self.changes.send_modify(|rev| rev.seq += 1);
    }
}
