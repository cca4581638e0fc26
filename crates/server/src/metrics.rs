//! Prometheus wiring for query dispatch.

use std::time::Duration;

use matcher::{MatchMetrics, QueryKind, SearchStrategy};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// [`MatchMetrics`] that forwards to the global `metrics` recorder.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusMatchMetrics;

impl MatchMetrics for PrometheusMatchMetrics {
    fn record_match(
        &self,
        kind: QueryKind,
        strategy: SearchStrategy,
        latency: Duration,
        hit_count: usize,
    ) {
        metrics::counter!(
            "chem_search_queries_total",
            "kind" => kind.as_str(),
            "match_type" => strategy.as_str()
        )
        .increment(1);
        metrics::histogram!("chem_search_query_seconds", "kind" => kind.as_str())
            .record(latency.as_secs_f64());
        metrics::histogram!("chem_search_query_hits", "kind" => kind.as_str())
            .record(hit_count as f64);
    }

    fn record_failure(&self, kind: QueryKind, code: &str) {
        metrics::counter!(
            "chem_search_query_failures_total",
            "kind" => kind.as_str(),
            "code" => code.to_string()
        )
        .increment(1);
    }
}

/// Install the process-wide Prometheus recorder.
///
/// Fails if another recorder was installed first.
pub fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}
