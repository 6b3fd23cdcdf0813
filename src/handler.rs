//! Trait definition for pluggable query handlers, plus the registry
//! the coordinator dispatches from.
//!
//! Each result producer (applications, files, calculator, web
//! shortcuts, …) implements [`QueryHandler`] to provide a uniform
//! interface for session lifecycle hooks and query handling. Handlers
//! live behind `Arc<dyn QueryHandler>` in a [`HandlerRegistry`] and are
//! invoked through dynamic dispatch.

use std::collections::HashSet;
use std::sync::Arc;

use crate::context::QueryContext;
use crate::error::{QueryError, Result};
use crate::types::ExecutionClass;

/// A pluggable query handler.
///
/// Implementors produce [`crate::types::ResultItem`]s for a search
/// term by appending them to the shared [`QueryContext`]. Each handler
/// declares its own:
///
/// - unique identifier
/// - trigger prefixes that make it run exclusively
/// - execution class (Batch or Realtime, fixed for its lifetime)
///
/// All implementations must be `Send + Sync`: `handle_query` runs
/// concurrently with other handlers, one blocking unit of work per
/// handler per query, with no event loop available.
pub trait QueryHandler: Send + Sync {
    /// Unique identifier of this handler.
    fn id(&self) -> &str;

    /// Trigger prefixes that make this handler run exclusively.
    ///
    /// A handler with multiple triggers runs once if any of them is a
    /// prefix of the search term. Realtime handlers that return no
    /// triggers here are never scheduled.
    fn triggers(&self) -> Vec<String> {
        Vec::new()
    }

    /// The execution class of this handler. Fixed for its lifetime.
    fn execution_class(&self) -> ExecutionClass {
        ExecutionClass::Batch
    }

    /// Called once when the user starts a session, before the first
    /// query. Keep this fast; the session does not begin until every
    /// handler's setup returns.
    fn setup_session(&self) {}

    /// Called once when the user finishes a session. Should not block:
    /// the user may start another session immediately.
    fn teardown_session(&self) {}

    /// Handle one query by appending results to `query`.
    ///
    /// Called for every user input, in a blocking thread without an
    /// event loop, possibly concurrently with other handlers. Results
    /// appended inside the batch sort window are presented in
    /// usage-ranked order; later ones are appended as-is. Queries get
    /// superseded, so long-running work must poll
    /// [`QueryContext::is_valid`] and abort promptly once it turns
    /// false.
    ///
    /// # Errors
    ///
    /// An error (like a panic) is caught at the dispatch boundary and
    /// logged; the handler simply contributes zero results and other
    /// handlers are unaffected.
    fn handle_query(&self, query: &QueryContext) -> Result<()>;
}

/// Ordered collection of registered query handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn QueryHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, preserving registration order.
    ///
    /// A Realtime handler with no trigger is accepted but logged as a
    /// diagnostic; it can never enter an applicable set, so it is a
    /// no-op by construction.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Registry`] if a handler with the same id
    /// is already registered.
    pub fn register(&mut self, handler: Arc<dyn QueryHandler>) -> Result<()> {
        if self.handlers.iter().any(|h| h.id() == handler.id()) {
            return Err(QueryError::Registry(format!(
                "duplicate handler id: {}",
                handler.id()
            )));
        }
        if handler.execution_class() == ExecutionClass::Realtime && handler.triggers().is_empty() {
            tracing::warn!(
                handler = %handler.id(),
                "realtime handler has no trigger and will never be scheduled"
            );
        }
        self.handlers.push(handler);
        Ok(())
    }

    /// All registered handlers, in registration order.
    pub fn handlers(&self) -> &[Arc<dyn QueryHandler>] {
        &self.handlers
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Set of all registered handler ids.
    pub fn ids(&self) -> HashSet<String> {
        self.handlers.iter().map(|h| h.id().to_string()).collect()
    }
}
