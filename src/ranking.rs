//! Usage-based relevance ranking for result items.
//!
//! Assigns scores from historical selection events:
//! - every past selection of a usage key contributes to its score
//! - recent selections count more than old ones
//!
//! Formula: `score(key) = Σ DECAY^age` over all selection events for
//! that key, where `age` is the number of selections recorded after it.
//! An item selected often *and* recently ranks first; untracked items
//! score 0.0 and fall back to their producer-declared sort key.
//!
//! The table is rebuilt wholesale at session boundaries, never during a
//! query; query-time cost is comparator application only.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::store::UsageStore;
use crate::types::ResultItem;

/// Per-event recency decay. Each newer selection event devalues every
/// older one by this factor.
const RECENCY_DECAY: f64 = 0.9;

/// A rebuildable ordering function over result items, derived from
/// historical usage.
///
/// Shared read-only by all concurrent handler invocations during a
/// query; mutated only by [`rebuild`](Self::rebuild), which must not
/// overlap with an in-flight query.
#[derive(Debug, Default)]
pub struct RelevanceRanker {
    scores: RwLock<HashMap<String, f64>>,
}

impl RelevanceRanker {
    /// Creates a ranker with no usage history. Every comparison falls
    /// back to the producer-declared order until the first rebuild.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recomputes the score table from the store's chronological
    /// usage-event list (oldest first).
    ///
    /// A store read failure is logged and the previous table is kept;
    /// a stale ranking never fails a session.
    pub fn rebuild(&self, store: &dyn UsageStore) {
        let events = match store.usage_events() {
            Ok(events) => events,
            Err(err) => {
                tracing::warn!(error = %err, "usage store read failed, keeping previous rankings");
                return;
            }
        };

        let total = events.len();
        let mut scores: HashMap<String, f64> = HashMap::new();
        for (index, key) in events.into_iter().enumerate() {
            let age = (total - 1 - index) as i32;
            *scores.entry(key).or_insert(0.0) += RECENCY_DECAY.powi(age);
        }

        tracing::debug!(tracked = scores.len(), events = total, "relevance rankings rebuilt");
        *self.scores.write().unwrap_or_else(|e| e.into_inner()) = scores;
    }

    /// Historical usage score for a usage key. Untracked keys score 0.0.
    pub fn score(&self, usage_key: &str) -> f64 {
        self.scores
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(usage_key)
            .copied()
            .unwrap_or(0.0)
    }

    /// Comparator over result items: descending usage score, then
    /// ascending producer-declared sort key. Remaining ties compare
    /// `Equal` so stable sorts preserve arrival order.
    pub fn compare(&self, a: &ResultItem, b: &ResultItem) -> Ordering {
        let score_a = self.score(&a.usage_key);
        let score_b = self.score(&b.usage_key);
        match score_b.partial_cmp(&score_a).unwrap_or(Ordering::Equal) {
            Ordering::Equal => a.sort_key.cmp(&b.sort_key),
            ordering => ordering,
        }
    }

    /// Number of usage keys with a tracked score.
    pub fn tracked(&self) -> usize {
        self.scores.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}
