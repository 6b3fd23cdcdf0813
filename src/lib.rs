//! # glint
//!
//! Embedded query dispatch and usage-ranked result merging for
//! interactive launchers.
//!
//! As the user types, each search term fans out to the applicable set
//! of result-producing handlers, which run concurrently as blocking
//! units of work. Their output is merged into one ranked list and
//! published to the UI boundary as coalesced result batches, while a
//! new keystroke supersedes the in-flight query without waiting for it.
//!
//! ## Design
//!
//! - Trigger prefixes make handlers run exclusively; untriggered Batch
//!   handlers are the fallback set, and Realtime handlers only ever run
//!   through a trigger
//! - Batch results are usage-ranked inside a 100 ms sort window, then
//!   appended unsorted, trading ranking accuracy for responsiveness
//!   once the user is already looking at a good-enough list
//! - Realtime results skip ranking and coalesce into notifications at
//!   most every 50 ms
//! - Cancellation is cooperative: a superseded query's validity flag
//!   flips once, handlers poll it, and its output stops being forwarded
//! - Relevance rankings rebuild from persisted usage history at session
//!   boundaries only, so query-time ranking is comparator application
//!
//! ## Boundaries
//!
//! Handler discovery/loading, UI rendering, configuration persistence,
//! and durable storage of usage statistics live outside this crate;
//! they interoperate through [`QueryHandler`], the
//! [`QueryNotification`] stream, [`EngineConfig`], and [`UsageStore`].
//!
//! ## Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use glint::*;
//! # struct AppHandler;
//! # impl QueryHandler for AppHandler {
//! #     fn id(&self) -> &str { "apps" }
//! #     fn handle_query(&self, _query: &QueryContext) -> Result<()> { Ok(()) }
//! # }
//! # async fn example() -> Result<()> {
//! let mut registry = HandlerRegistry::new();
//! registry.register(Arc::new(AppHandler))?;
//!
//! let store = Arc::new(MemoryUsageStore::new());
//! let (coordinator, mut notifications) =
//!     QueryCoordinator::new(registry, store, EngineConfig::default())?;
//!
//! coordinator.setup_session();
//! coordinator.start_query("fire");
//! while let Some(notification) = notifications.recv().await {
//!     if let QueryNotification::ResultsReady { items, .. } = notification {
//!         println!("{} results", items.len());
//!         break;
//!     }
//! }
//! coordinator.teardown_session();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod execution;
pub mod handler;
pub mod ranking;
pub mod selection;
pub mod store;
pub mod types;

pub use config::EngineConfig;
pub use context::QueryContext;
pub use coordinator::QueryCoordinator;
pub use error::{QueryError, Result};
pub use execution::QueryExecution;
pub use handler::{HandlerRegistry, QueryHandler};
pub use ranking::RelevanceRanker;
pub use selection::applicable_handlers;
pub use store::{MemoryUsageStore, UsageStore};
pub use types::{
    ExecutionClass, HandlerRuntime, QueryNotification, QueryState, ResultItem,
};
