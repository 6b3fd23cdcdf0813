//! Top-level query orchestrator: supersession, session lifecycle, and
//! the single outward notification stream.
//!
//! Holds at most one logically current query execution. A new search
//! term cancels the previous execution without blocking; it keeps
//! running in the background to finish its bookkeeping, but its output
//! is no longer observable externally. Finished executions are
//! retained only until session teardown, when their per-handler
//! runtime records are harvested and handed to the durable store.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::execution::QueryExecution;
use crate::handler::HandlerRegistry;
use crate::ranking::RelevanceRanker;
use crate::selection::applicable_handlers;
use crate::store::UsageStore;
use crate::types::{QueryNotification, QueryState};

/// Orchestrates query executions over a fixed handler registry.
pub struct QueryCoordinator {
    registry: HandlerRegistry,
    ranker: Arc<RelevanceRanker>,
    store: Arc<dyn UsageStore>,
    incremental_sort: AtomicBool,
    sort_window: Duration,
    throttle: Duration,
    next_id: AtomicU64,
    executions: Mutex<Vec<Arc<QueryExecution>>>,
    notifier: mpsc::UnboundedSender<QueryNotification>,
}

impl QueryCoordinator {
    /// Creates a coordinator and the notification stream the UI
    /// boundary consumes. Rebuilds the relevance rankings from the
    /// store's usage history up front.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::QueryError::Config`] if `config` is
    /// invalid.
    pub fn new(
        registry: HandlerRegistry,
        store: Arc<dyn UsageStore>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<QueryNotification>)> {
        config.validate()?;
        let ranker = Arc::new(RelevanceRanker::new());
        ranker.rebuild(store.as_ref());
        let (notifier, notifications) = mpsc::unbounded_channel();
        let coordinator = Self {
            registry,
            ranker,
            store,
            incremental_sort: AtomicBool::new(config.incremental_sort),
            sort_window: Duration::from_millis(config.batch_sort_window_ms),
            throttle: Duration::from_millis(config.realtime_throttle_ms),
            next_id: AtomicU64::new(1),
            executions: Mutex::new(Vec::new()),
            notifier,
        };
        Ok((coordinator, notifications))
    }

    /// Starts a session: rebuilds the relevance rankings, then invokes
    /// every registered handler's setup hook sequentially, each timed
    /// independently.
    pub fn setup_session(&self) {
        tracing::debug!("session setup started");
        let overall = Instant::now();

        self.ranker.rebuild(self.store.as_ref());

        for handler in self.registry.handlers() {
            let started = Instant::now();
            handler.setup_session();
            tracing::debug!(
                handler = %handler.id(),
                elapsed_us = started.elapsed().as_micros() as u64,
                "session setup"
            );
        }

        tracing::debug!(
            elapsed_us = overall.elapsed().as_micros() as u64,
            "session setup finished"
        );
    }

    /// Ends a session: invokes every handler's teardown hook, clears
    /// the UI, harvests runtime records from settled executions and
    /// hands them to the durable store, then rebuilds the relevance
    /// rankings. Safe to call twice in a row: the second call finds
    /// nothing left to harvest and duplicates no records.
    pub fn teardown_session(&self) {
        tracing::debug!("session teardown started");
        let overall = Instant::now();

        for handler in self.registry.handlers() {
            let started = Instant::now();
            handler.teardown_session();
            tracing::debug!(
                handler = %handler.id(),
                elapsed_us = started.elapsed().as_micros() as u64,
                "session teardown"
            );
        }

        let _ = self.notifier.send(QueryNotification::SessionCleared);

        // Harvest runtime records from every settled execution and
        // discard it; executions still running keep their records for
        // the next teardown.
        let mut records = Vec::new();
        {
            let mut executions = self.executions.lock().unwrap_or_else(|e| e.into_inner());
            executions.retain(|execution| {
                if execution.state() == QueryState::Running {
                    true
                } else {
                    records.extend(execution.runtimes());
                    false
                }
            });
        }
        if !records.is_empty() {
            if let Err(err) = self.store.record_runtimes(&records) {
                tracing::warn!(error = %err, "failed to persist handler runtimes");
            }
        }

        self.ranker.rebuild(self.store.as_ref());

        tracing::debug!(
            elapsed_us = overall.elapsed().as_micros() as u64,
            "session teardown finished"
        );
    }

    /// Starts a query for `term`, superseding the previous one.
    ///
    /// The previous execution (if any) is cancelled: its validity flag
    /// flips and its notifications stop, but it keeps running in the
    /// background until its handlers return. The new execution becomes
    /// current and its notifications flow to the UI boundary. Must be
    /// called from within a tokio runtime.
    pub fn start_query(&self, term: &str) -> Arc<QueryExecution> {
        tracing::debug!(term, "query started");

        {
            let executions = self.executions.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(previous) = executions.last() {
                previous.cancel();
            }
        }

        let applicable = applicable_handlers(term, self.registry.handlers());
        tracing::debug!(term, handlers = applicable.len(), "applicable set computed");

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let execution = QueryExecution::new(
            id,
            term,
            applicable,
            Arc::clone(&self.ranker),
            self.incremental_sort.load(Ordering::Relaxed),
            self.sort_window,
            self.throttle,
            self.notifier.clone(),
        );

        // Overall query latency, logged when the execution settles.
        let started = Instant::now();
        let mut state = execution.subscribe_state();
        tokio::spawn(async move {
            while state.changed().await.is_ok() {
                if *state.borrow() == QueryState::Finished {
                    tracing::debug!(
                        query_id = id,
                        elapsed_us = started.elapsed().as_micros() as u64,
                        "query finished"
                    );
                    break;
                }
            }
        });

        execution.run();
        self.executions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::clone(&execution));
        execution
    }

    /// The logically current execution, if any query was started since
    /// the last harvest.
    pub fn current(&self) -> Option<Arc<QueryExecution>> {
        self.executions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    /// Whether batch results are sorted incrementally inside the sort
    /// window.
    pub fn incremental_sort(&self) -> bool {
        self.incremental_sort.load(Ordering::Relaxed)
    }

    /// Sets the incremental-sort flag. Takes effect from the next
    /// query; persistence is the configuration collaborator's concern.
    pub fn set_incremental_sort(&self, value: bool) {
        self.incremental_sort.store(value, Ordering::Relaxed);
    }

    /// The relevance ranker shared with every execution.
    pub fn ranker(&self) -> &Arc<RelevanceRanker> {
        &self.ranker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::QueryContext;
    use crate::handler::QueryHandler;
    use crate::store::MemoryUsageStore;
    use crate::types::{ExecutionClass, ResultItem};
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    struct CountingHandler {
        id: String,
        setups: AtomicUsize,
        teardowns: AtomicUsize,
        delay: Duration,
    }

    impl CountingHandler {
        fn arc(id: &str, delay_ms: u64) -> Arc<dyn QueryHandler> {
            Arc::new(Self {
                id: id.into(),
                setups: AtomicUsize::new(0),
                teardowns: AtomicUsize::new(0),
                delay: Duration::from_millis(delay_ms),
            })
        }
    }

    impl QueryHandler for CountingHandler {
        fn id(&self) -> &str {
            &self.id
        }
        fn setup_session(&self) {
            self.setups.fetch_add(1, Ordering::Relaxed);
        }
        fn teardown_session(&self) {
            self.teardowns.fetch_add(1, Ordering::Relaxed);
        }
        fn handle_query(&self, query: &QueryContext) -> Result<()> {
            thread::sleep(self.delay);
            query.add_item(ResultItem {
                handler_id: self.id.clone(),
                payload: serde_json::json!({"term": query.term()}),
                usage_key: format!("{}:{}", self.id, query.term()),
                sort_key: 0,
            });
            Ok(())
        }
    }

    fn coordinator_with(
        handlers: Vec<Arc<dyn QueryHandler>>,
        store: Arc<MemoryUsageStore>,
    ) -> (
        QueryCoordinator,
        mpsc::UnboundedReceiver<QueryNotification>,
    ) {
        let mut registry = HandlerRegistry::new();
        for handler in handlers {
            registry.register(handler).expect("register");
        }
        QueryCoordinator::new(registry, store, EngineConfig::default()).expect("coordinator")
    }

    async fn wait_finished(execution: &Arc<QueryExecution>) {
        let mut state = execution.subscribe_state();
        while *state.borrow() != QueryState::Finished {
            state.changed().await.expect("state channel open");
        }
    }

    #[test]
    fn invalid_config_rejected() {
        let config = EngineConfig {
            batch_sort_window_ms: 0,
            ..Default::default()
        };
        let result = QueryCoordinator::new(
            HandlerRegistry::new(),
            Arc::new(MemoryUsageStore::new()),
            config,
        );
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn session_hooks_invoked_once_per_handler() {
        let handler = Arc::new(CountingHandler {
            id: "apps".into(),
            setups: AtomicUsize::new(0),
            teardowns: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });
        let (coordinator, _rx) = coordinator_with(
            vec![handler.clone() as Arc<dyn QueryHandler>],
            Arc::new(MemoryUsageStore::new()),
        );

        coordinator.setup_session();
        coordinator.teardown_session();

        assert_eq!(handler.setups.load(Ordering::Relaxed), 1);
        assert_eq!(handler.teardowns.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn supersession_invalidates_previous_query() {
        let (coordinator, _rx) = coordinator_with(
            vec![CountingHandler::arc("apps", 40)],
            Arc::new(MemoryUsageStore::new()),
        );

        let first = coordinator.start_query("a");
        let second = coordinator.start_query("ab");

        assert!(!first.context().is_valid());
        assert!(second.context().is_valid());
        assert_ne!(first.id(), second.id());

        wait_finished(&first).await;
        wait_finished(&second).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn teardown_harvests_runtimes_once() {
        let store = Arc::new(MemoryUsageStore::new());
        let (coordinator, _rx) =
            coordinator_with(vec![CountingHandler::arc("apps", 0)], store.clone());

        let execution = coordinator.start_query("hello");
        wait_finished(&execution).await;

        coordinator.teardown_session();
        let harvested = store.runtimes();
        assert_eq!(harvested.len(), 1);
        assert_eq!(harvested[0].handler_id, "apps");

        // Second teardown without an intervening query: no duplicates,
        // no fault.
        coordinator.teardown_session();
        assert_eq!(store.runtimes().len(), 1);
        assert!(coordinator.current().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_write_failure_does_not_fail_teardown() {
        let store = Arc::new(MemoryUsageStore::new());
        let (coordinator, _rx) =
            coordinator_with(vec![CountingHandler::arc("apps", 0)], store.clone());

        let execution = coordinator.start_query("hello");
        wait_finished(&execution).await;

        store.fail_writes(true);
        store.fail_reads(true);
        coordinator.teardown_session();
        // Records are discarded on failure, never retried.
        store.fail_writes(false);
        coordinator.teardown_session();
        assert!(store.runtimes().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn incremental_sort_flag_round_trip() {
        let (coordinator, _rx) =
            coordinator_with(vec![], Arc::new(MemoryUsageStore::new()));
        assert!(!coordinator.incremental_sort());
        coordinator.set_incremental_sort(true);
        assert!(coordinator.incremental_sort());
        coordinator.set_incremental_sort(false);
        assert!(!coordinator.incremental_sort());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn teardown_emits_session_cleared() {
        let (coordinator, mut rx) =
            coordinator_with(vec![], Arc::new(MemoryUsageStore::new()));
        coordinator.teardown_session();
        let mut cleared = false;
        while let Ok(notification) = rx.try_recv() {
            if matches!(notification, QueryNotification::SessionCleared) {
                cleared = true;
            }
        }
        assert!(cleared);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rankings_rebuilt_at_session_boundaries() {
        let store = Arc::new(MemoryUsageStore::new());
        let (coordinator, _rx) = coordinator_with(vec![], store.clone());
        assert_eq!(coordinator.ranker().tracked(), 0);

        store.push_usage("apps:firefox");
        coordinator.setup_session();
        assert_eq!(coordinator.ranker().tracked(), 1);

        store.push_usage("apps:gimp");
        coordinator.teardown_session();
        assert_eq!(coordinator.ranker().tracked(), 2);
    }
}
