// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = (&$name, &$value $(, &$label, &$label_value)*);
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = (&$name, &$value $(, &$label, &$label_value)*);
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = (&$name, &$value $(, &$label, &$label_value)*);
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Registers descriptions for every metric the crate emits. Call once at startup.
pub fn describe_metrics() {
    describe_counter!(
        "blocklist_candidates_total",
        "Raw candidates fetched per source and reconciliation run."
    );
    describe_counter!(
        "blocklist_added_total",
        "New blocklist rows written by the reconciler, per source."
    );
    describe_counter!(
        "blocklist_source_failures_total",
        "Sources skipped for a run because they errored or timed out."
    );
    describe_gauge!(
        "blocklist_known_set_size",
        "Keys loaded into the known-set index, per category."
    );
    describe_counter!(
        "blocklist_cache_hits_total",
        "Lookups answered from the store without an external call."
    );
    describe_counter!(
        "blocklist_cache_misses_total",
        "Lookups that had to ask a verification source."
    );
    describe_counter!(
        "blocklist_verifier_calls_total",
        "Third-party API calls per verifier and outcome (flagged, clean, ok, error)."
    );
    describe_counter!(
        "blocklist_purged_total",
        "Expired verified rows removed by the purge."
    );
    describe_histogram!(
        "blocklist_run_duration_seconds",
        "Wall time of one reconciliation run."
    );
}

pub fn increment_candidates(source: &str, count: u64) {
    counter!("blocklist_candidates_total", count, "source" => source.to_string());
}

pub fn increment_added(source: &str, count: u64) {
    counter!("blocklist_added_total", count, "source" => source.to_string());
}

pub fn increment_source_failure(source: &str) {
    counter!("blocklist_source_failures_total", 1, "source" => source.to_string());
}

pub fn set_known_set_size(category: &str, size: f64) {
    gauge!("blocklist_known_set_size", size, "category" => category.to_string());
}

pub fn increment_cache_hit(kind: &str) {
    increment_cache_hits(kind, 1);
}

pub fn increment_cache_hits(kind: &str, count: u64) {
    counter!("blocklist_cache_hits_total", count, "kind" => kind.to_string());
}

pub fn increment_cache_miss(kind: &str) {
    counter!("blocklist_cache_misses_total", 1, "kind" => kind.to_string());
}

pub fn increment_verifier_call(verifier: &str, outcome: &'static str) {
    counter!(
        "blocklist_verifier_calls_total",
        1,
        "verifier" => verifier.to_string(),
        "outcome" => outcome
    );
}

pub fn increment_purged(count: u64) {
    counter!("blocklist_purged_total", count);
}

pub fn record_run_duration(seconds: f64) {
    histogram!("blocklist_run_duration_seconds", seconds);
}

/// Installs the Prometheus exporter on `addr` (observability builds only).
#[cfg(feature = "observability")]
pub fn install_prometheus_exporter(addr: std::net::SocketAddr) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}
