//! Engine configuration with sensible defaults.
//!
//! [`EngineConfig`] controls the incremental-sort behaviour and the two
//! soft real-time policy windows. How the values are persisted is the
//! embedding application's concern; the engine consumes them as plain
//! fields.

use crate::error::QueryError;

/// Configuration for a query coordinator.
///
/// Use [`Default::default()`] for the stock launcher behaviour, or
/// construct with field overrides for custom timing.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Whether batch results arriving inside the sort window are
    /// sorted-inserted and published incrementally. When disabled,
    /// in-window batch results are held back and published as one
    /// sorted snapshot at the presentation boundary.
    pub incremental_sort: bool,
    /// Length of the batch sort window in milliseconds. Batch items
    /// appended after this window are appended unsorted.
    pub batch_sort_window_ms: u64,
    /// Minimum spacing between results-ready notifications in
    /// milliseconds. Results arriving within a window are coalesced
    /// into the next emission (trailing buffer).
    pub realtime_throttle_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            incremental_sort: false,
            batch_sort_window_ms: 100,
            realtime_throttle_ms: 50,
        }
    }
}

impl EngineConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `batch_sort_window_ms` must be greater than 0
    /// - `realtime_throttle_ms` must be greater than 0
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.batch_sort_window_ms == 0 {
            return Err(QueryError::Config(
                "batch_sort_window_ms must be greater than 0".into(),
            ));
        }
        if self.realtime_throttle_ms == 0 {
            return Err(QueryError::Config(
                "realtime_throttle_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
