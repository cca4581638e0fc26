// Metrics hooks for query dispatch.
//
// Callers install a global `MatchMetrics` implementation via [`set_match_metrics`];
// `QueryDispatcher` then reports latency and hit counts for every dispatched
// query. This keeps instrumentation decoupled from any specific metrics backend.
use std::sync::{Arc, RwLock};
use std::time::Duration;

use once_cell::sync::OnceCell;

use crate::types::{QueryKind, SearchStrategy};

/// Metrics observer for dispatched queries.
pub trait MatchMetrics: Send + Sync {
    /// Record a completed query.
    ///
    /// `strategy` is the effective match type, `latency` covers the toolkit
    /// call and ranking, and `hit_count` is the size of the ranked answer.
    fn record_match(
        &self,
        kind: QueryKind,
        strategy: SearchStrategy,
        latency: Duration,
        hit_count: usize,
    );

    /// Record a query that ended in an error with the given error code.
    fn record_failure(&self, kind: QueryKind, code: &str) {
        let _ = (kind, code);
    }
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn MatchMetrics>>> {
    static METRICS: OnceCell<RwLock<Option<Arc<dyn MatchMetrics>>>> = OnceCell::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

pub(crate) fn metrics_recorder() -> Option<Arc<dyn MatchMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

/// Install or clear the global match metrics recorder.
///
/// Typically called once during service startup.
pub fn set_match_metrics(recorder: Option<Arc<dyn MatchMetrics>>) {
    let mut guard = metrics_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}
