//! Core types for query results, handler classification, and the
//! outward notification stream.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single result produced by a query handler.
///
/// The engine treats the payload as opaque; only the launcher UI
/// interprets it. Ranking reads `usage_key` (historical usage lookup)
/// and falls back to `sort_key` (producer-declared order) for items
/// with no usage history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultItem {
    /// Identifier of the handler that produced this item.
    pub handler_id: String,
    /// Opaque payload interpreted by the UI boundary, not the engine.
    pub payload: serde_json::Value,
    /// Identity used to look up historical usage for ranking.
    /// Mutable until the item is published into a query context.
    pub usage_key: String,
    /// Producer-declared display order; the ranking fallback for
    /// items with equal (or no) usage history.
    pub sort_key: u32,
}

/// Execution class of a query handler.
///
/// Batch handlers participate in the ranked, windowed batch stage:
/// items appended inside the sort window are presented in usage-ranked
/// order, later items are appended unsorted. Realtime handlers bypass
/// ranking entirely: their items are appended in arrival order and
/// published on a coalescing throttle. Realtime handlers must declare
/// a trigger or they will never be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionClass {
    /// Ranked, windowed stage. May run triggered or untriggered.
    Batch,
    /// Unranked, throttled stage. Only ever runs triggered.
    Realtime,
}

impl fmt::Display for ExecutionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Batch => f.write_str("Batch"),
            Self::Realtime => f.write_str("Realtime"),
        }
    }
}

/// Lifecycle state of a single query execution.
///
/// Transitions are strictly `Created → Running → Finished`.
/// Cancellation is an independent level-triggered signal (the query
/// context's validity flag), not a state: a cancelled execution still
/// runs to `Finished` for bookkeeping, it just stops notifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryState {
    /// Constructed, not yet dispatched.
    Created,
    /// Handlers dispatched, results flowing.
    Running,
    /// Every dispatched handler has returned.
    Finished,
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("Created"),
            Self::Running => f.write_str("Running"),
            Self::Finished => f.write_str("Finished"),
        }
    }
}

/// Elapsed wall-clock time of one handler invocation within one query.
///
/// Harvested at session teardown and handed to the durable store in a
/// batch; the engine itself never persists these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerRuntime {
    /// Identifier of the timed handler.
    pub handler_id: String,
    /// Elapsed microseconds for the invocation.
    pub elapsed_micros: u64,
}

/// Notification emitted to the external (UI) boundary.
#[derive(Debug, Clone)]
pub enum QueryNotification {
    /// The current ordered result sequence of a query execution.
    ResultsReady {
        /// Execution the snapshot belongs to.
        query_id: u64,
        /// Full ordered snapshot; consumers replace, not append.
        items: Vec<ResultItem>,
    },
    /// A query execution changed lifecycle state.
    StateChanged {
        /// Execution whose state changed.
        query_id: u64,
        /// The new state.
        state: QueryState,
    },
    /// Session torn down; consumers should clear any displayed results.
    SessionCleared,
}
