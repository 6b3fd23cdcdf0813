//! Error types for the glint query engine.
//!
//! Failures are contained at the smallest scope possible: a single
//! handler's failure never fails the query, a single query's failure
//! never fails the session, and nothing here is process-fatal. Errors
//! that cross the dispatch or store boundary are logged and absorbed,
//! so most of these variants surface only at registration or
//! configuration time.

/// Errors that can occur inside the query engine.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Invalid engine configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Handler registration failed (e.g. duplicate identifier).
    #[error("registry error: {0}")]
    Registry(String),

    /// A handler invocation failed. Caught at the dispatch boundary:
    /// the handler contributes zero results, other handlers are
    /// unaffected.
    #[error("handler error: {0}")]
    Handler(String),

    /// The durable usage/runtime store failed. Logged and discarded,
    /// never allowed to block session teardown or the next query.
    #[error("usage store error: {0}")]
    Store(String),
}

/// Convenience type alias for glint results.
pub type Result<T> = std::result::Result<T, QueryError>;
