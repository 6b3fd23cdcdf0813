//! Durable usage/runtime store boundary.
//!
//! The engine never persists anything itself: per-handler runtime
//! records are handed to a [`UsageStore`] at session teardown, and the
//! relevance ranker reads its usage history back at session
//! boundaries. Store failures are logged by the callers and discarded;
//! they never block teardown or the next query.

use std::sync::Mutex;

use crate::error::{QueryError, Result};
use crate::types::HandlerRuntime;

/// Collaborator responsible for durable storage of usage statistics
/// and handler runtime records.
pub trait UsageStore: Send + Sync {
    /// Persists a batch of per-handler runtime records. Fire-and-forget
    /// from the engine's perspective: an error is logged by the caller
    /// and discarded.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Store`] if persistence failed. The engine
    /// never retries.
    fn record_runtimes(&self, records: &[HandlerRuntime]) -> Result<()>;

    /// Chronological result-selection events, oldest first. Each entry
    /// is the usage key of a selected result item. Consumed by
    /// [`crate::ranking::RelevanceRanker::rebuild`].
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Store`] if the history cannot be read; the
    /// ranker keeps its previous table in that case.
    fn usage_events(&self) -> Result<Vec<String>>;
}

/// In-process [`UsageStore`] backed by plain vectors.
///
/// Suitable for embedders that wire durable persistence elsewhere, and
/// for tests. Can be switched into a failing mode to exercise the
/// engine's fault containment.
#[derive(Debug, Default)]
pub struct MemoryUsageStore {
    runtimes: Mutex<Vec<HandlerRuntime>>,
    usage: Mutex<Vec<String>>,
    fail_writes: Mutex<bool>,
    fail_reads: Mutex<bool>,
}

impl MemoryUsageStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one result selection. Embedders call this when the user
    /// activates an item; the ranker picks it up at the next rebuild,
    /// not live.
    pub fn push_usage(&self, usage_key: &str) {
        self.usage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(usage_key.to_string());
    }

    /// All runtime records persisted so far.
    pub fn runtimes(&self) -> Vec<HandlerRuntime> {
        self.runtimes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Makes subsequent [`record_runtimes`](UsageStore::record_runtimes)
    /// calls fail.
    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    /// Makes subsequent [`usage_events`](UsageStore::usage_events)
    /// calls fail.
    pub fn fail_reads(&self, fail: bool) {
        *self.fail_reads.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }
}

impl UsageStore for MemoryUsageStore {
    fn record_runtimes(&self, records: &[HandlerRuntime]) -> Result<()> {
        if *self.fail_writes.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(QueryError::Store("simulated write failure".into()));
        }
        self.runtimes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(records);
        Ok(())
    }

    fn usage_events(&self) -> Result<Vec<String>> {
        if *self.fail_reads.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(QueryError::Store("simulated read failure".into()));
        }
        Ok(self.usage.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accumulate_across_batches() {
        let store = MemoryUsageStore::new();
        let first = vec![HandlerRuntime {
            handler_id: "apps".into(),
            elapsed_micros: 120,
        }];
        let second = vec![HandlerRuntime {
            handler_id: "files".into(),
            elapsed_micros: 480,
        }];
        store.record_runtimes(&first).expect("write");
        store.record_runtimes(&second).expect("write");

        let all = store.runtimes();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].handler_id, "apps");
        assert_eq!(all[1].handler_id, "files");
    }

    #[test]
    fn usage_events_preserve_chronological_order() {
        let store = MemoryUsageStore::new();
        store.push_usage("first");
        store.push_usage("second");
        store.push_usage("first");
        assert_eq!(
            store.usage_events().expect("read"),
            vec!["first", "second", "first"]
        );
    }

    #[test]
    fn write_failure_mode() {
        let store = MemoryUsageStore::new();
        store.fail_writes(true);
        let err = store.record_runtimes(&[]).unwrap_err();
        assert!(err.to_string().contains("usage store error"));
        store.fail_writes(false);
        assert!(store.record_runtimes(&[]).is_ok());
    }

    #[test]
    fn read_failure_mode() {
        let store = MemoryUsageStore::new();
        store.fail_reads(true);
        assert!(store.usage_events().is_err());
        store.fail_reads(false);
        assert!(store.usage_events().expect("read").is_empty());
    }

    #[test]
    fn store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MemoryUsageStore>();
    }
}
