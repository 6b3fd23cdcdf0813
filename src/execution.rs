//! Single-query scheduler: concurrent handler dispatch, policy timing,
//! and throttled result emission.
//!
//! Every applicable handler runs as its own blocking unit of work.
//! Batch items are presented in usage-ranked order up to the sort
//! window; Realtime items are appended in arrival order. All outward
//! notifications go through one emitter task with a trailing 50 ms
//! coalescing buffer, so bursts of appends collapse into single
//! results-ready notifications.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::context::QueryContext;
use crate::handler::QueryHandler;
use crate::ranking::RelevanceRanker;
use crate::types::{ExecutionClass, HandlerRuntime, QueryNotification, QueryState};

/// State machine for one query: `Created → Running → Finished`, with
/// cooperative cancellation as an independent signal.
///
/// A cancelled execution keeps running until every dispatched handler
/// has returned; the flag only suppresses outward notifications and
/// tells handlers to abort their own work. Runtime bookkeeping
/// survives cancellation so the coordinator can still harvest it.
pub struct QueryExecution {
    id: u64,
    context: Arc<QueryContext>,
    handlers: Vec<Arc<dyn QueryHandler>>,
    throttle: Duration,
    state: watch::Sender<QueryState>,
    notifier: mpsc::UnboundedSender<QueryNotification>,
}

impl QueryExecution {
    /// Creates an execution for `term` over an already-computed
    /// applicable handler set. Emits `StateChanged(Created)`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: u64,
        term: &str,
        handlers: Vec<Arc<dyn QueryHandler>>,
        ranker: Arc<RelevanceRanker>,
        incremental_sort: bool,
        sort_window: Duration,
        throttle: Duration,
        notifier: mpsc::UnboundedSender<QueryNotification>,
    ) -> Arc<Self> {
        let dispatched: HashMap<String, ExecutionClass> = handlers
            .iter()
            .map(|h| (h.id().to_string(), h.execution_class()))
            .collect();
        let context = Arc::new(QueryContext::new(
            term.to_string(),
            dispatched,
            ranker,
            incremental_sort,
            sort_window,
        ));
        let (state, _) = watch::channel(QueryState::Created);
        let execution = Arc::new(Self {
            id,
            context,
            handlers,
            throttle,
            state,
            notifier,
        });
        execution.notify_state(QueryState::Created);
        execution
    }

    /// Identifier of this execution, unique per coordinator.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The shared query context.
    pub fn context(&self) -> &Arc<QueryContext> {
        &self.context
    }

    /// Current lifecycle state.
    pub fn state(&self) -> QueryState {
        *self.state.borrow()
    }

    /// Watch receiver over lifecycle state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<QueryState> {
        self.state.subscribe()
    }

    /// Per-handler runtime records accumulated so far.
    pub fn runtimes(&self) -> Vec<HandlerRuntime> {
        self.context.runtimes()
    }

    /// Signals cooperative cancellation: flips the context's validity
    /// flag and suppresses all further outward notifications. In-flight
    /// handler invocations are not interrupted; they are expected to
    /// observe the flag and return.
    pub fn cancel(&self) {
        self.context.cancel();
    }

    /// Dispatches every handler in the applicable set and starts the
    /// emitter and completion tasks. Call once, from within a tokio
    /// runtime.
    pub fn run(self: &Arc<Self>) {
        self.state.send_replace(QueryState::Running);
        self.notify_state(QueryState::Running);

        let mut batch_joins = Vec::new();
        let mut realtime_joins = Vec::new();
        for handler in &self.handlers {
            let class = handler.execution_class();
            let join = self.dispatch(Arc::clone(handler));
            match class {
                ExecutionClass::Batch => batch_joins.push(join),
                ExecutionClass::Realtime => realtime_joins.push(join),
            }
        }

        let this = Arc::clone(self);
        tokio::spawn(async move { this.drive(batch_joins, realtime_joins).await });
    }

    /// Runs one handler invocation on the blocking pool. Faults are
    /// contained here: an `Err` or a panic is logged and the handler
    /// simply contributes zero results. The invocation is timed into
    /// the context's runtime table either way.
    fn dispatch(&self, handler: Arc<dyn QueryHandler>) -> JoinHandle<()> {
        let context = Arc::clone(&self.context);
        tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle_query(&context)));
            let elapsed_micros = started.elapsed().as_micros() as u64;
            context.record_runtime(handler.id(), elapsed_micros);
            match outcome {
                Ok(Ok(())) => {
                    tracing::debug!(handler = %handler.id(), elapsed_us = elapsed_micros, "handler finished");
                }
                Ok(Err(err)) => {
                    tracing::warn!(handler = %handler.id(), error = %err, "handler failed");
                }
                Err(_) => {
                    tracing::warn!(handler = %handler.id(), "handler panicked");
                }
            }
        })
    }

    /// Waits for handler completion in two stages: all Batch handlers
    /// (sealing the sort boundary), then the Realtime remainder, then
    /// transitions to `Finished`.
    async fn drive(self: Arc<Self>, batch: Vec<JoinHandle<()>>, realtime: Vec<JoinHandle<()>>) {
        let emitter = tokio::spawn(Arc::clone(&self).emit_results());

        for result in join_all(batch).await {
            if let Err(err) = result {
                tracing::warn!(query_id = self.id, error = %err, "batch handler task aborted");
            }
        }
        // Batch stage complete: first sorted presentation if the window
        // timer has not already sealed it.
        self.context.seal_boundary();

        for result in join_all(realtime).await {
            if let Err(err) = result {
                tracing::warn!(query_id = self.id, error = %err, "realtime handler task aborted");
            }
        }

        self.context.mark_finished();
        if let Err(err) = emitter.await {
            tracing::warn!(query_id = self.id, error = %err, "emitter task aborted");
        }
        // Enqueue the notification before flipping the watch: observers
        // synchronize on the watch and must find Finished already queued.
        self.notify_state(QueryState::Finished);
        self.state.send_replace(QueryState::Finished);
    }

    /// Publishes results-ready notifications.
    ///
    /// Plain appends coalesce in a trailing throttle window: a change
    /// is never published before `last_emit + throttle` (and never
    /// before `dispatch + throttle`), so appends at t=0,10,20,60 ms
    /// with a 50 ms throttle produce exactly two notifications. Urgent
    /// changes (the sorted boundary publication, completion,
    /// cancellation) cut the throttle short. A lapsed boundary timer
    /// seals the window even if no handler appends again.
    async fn emit_results(self: Arc<Self>) {
        let context = Arc::clone(&self.context);
        let mut changes = context.subscribe_changes();
        let started = context.started_at();
        let boundary = tokio::time::Instant::from_std(started + context.sort_window());
        let first_allowed = tokio::time::Instant::from_std(started) + self.throttle;
        let mut last_seen: u64 = 0;
        let mut last_emit: Option<tokio::time::Instant> = None;

        loop {
            tokio::select! {
                result = changes.wait_for(|rev| rev.seq != last_seen) => {
                    if result.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep_until(boundary), if !context.boundary_sealed() => {
                    context.seal_boundary();
                    continue;
                }
            }

            if !context.take_urgent() {
                let earliest = last_emit.map_or(first_allowed, |at| at + self.throttle);
                tokio::select! {
                    _ = tokio::time::sleep_until(earliest) => {}
                    result = changes.wait_for(|_| context.urgent_pending()) => {
                        if result.is_err() {
                            break;
                        }
                        context.take_urgent();
                    }
                }
            }

            last_seen = changes.borrow_and_update().seq;
            if !context.is_valid() {
                break;
            }
            let _ = self.notifier.send(QueryNotification::ResultsReady {
                query_id: self.id,
                items: context.snapshot(),
            });
            last_emit = Some(tokio::time::Instant::now());
            if context.is_finished() {
                break;
            }
        }
    }

    fn notify_state(&self, state: QueryState) {
        if self.context.is_valid() {
            let _ = self.notifier.send(QueryNotification::StateChanged {
                query_id: self.id,
                state,
            });
        }
    }
}
