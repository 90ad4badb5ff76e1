//! Metrics instrumentation for feed synchronization
//!
//! Provides Prometheus-compatible metrics for:
//! - Page load outcomes and latency
//! - Live item merge outcomes and ordering anomalies
//! - Live tail resubscriptions and lag
//! - Idle feed evictions
//! - Open feed count

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Metric names as constants for consistency
pub mod names {
    pub const PAGE_LOADS: &str = "feed_page_loads_total";
    pub const PAGE_LOAD_DURATION: &str = "feed_page_load_duration_seconds";
    pub const PAGE_ITEMS_MERGED: &str = "feed_page_items_merged_total";
    pub const LIVE_ITEMS: &str = "feed_live_items_total";
    pub const ORDERING_ANOMALIES: &str = "feed_ordering_anomalies_total";
    pub const TAIL_RESUBSCRIBES: &str = "feed_tail_resubscribes_total";
    pub const TAIL_LAGGED_ITEMS: &str = "feed_tail_lagged_items_total";
    pub const FEEDS_EVICTED: &str = "feed_instances_evicted_total";
    pub const FEEDS_OPEN: &str = "feed_instances_open";
}

/// Record the outcome of one page load ("ok", "discarded" or a `LoadError` kind)
pub fn record_page_load(outcome: &'static str, duration: std::time::Duration) {
    counter!(names::PAGE_LOADS, "outcome" => outcome).increment(1);
    histogram!(names::PAGE_LOAD_DURATION).record(duration.as_secs_f64());
}

/// Record how the items of a merged page were placed
pub fn record_page_items(appended: usize, backfilled: usize, duplicates: usize) {
    counter!(names::PAGE_ITEMS_MERGED, "placement" => "appended").increment(appended as u64);
    counter!(names::PAGE_ITEMS_MERGED, "placement" => "backfilled").increment(backfilled as u64);
    counter!(names::PAGE_ITEMS_MERGED, "placement" => "duplicate").increment(duplicates as u64);
}

/// Record a live item by merge outcome
pub fn record_live_item(outcome: &'static str) {
    counter!(names::LIVE_ITEMS, "outcome" => outcome).increment(1);
}

/// Record a source ordering violation
pub fn record_ordering_anomaly(anomaly_type: &'static str) {
    counter!(names::ORDERING_ANOMALIES, "type" => anomaly_type).increment(1);
}

/// Record a live tail resubscription
pub fn record_tail_resubscribe(reason: &'static str) {
    counter!(names::TAIL_RESUBSCRIBES, "reason" => reason).increment(1);
}

/// Record items a live subscription fell behind by
pub fn record_tail_lag(skipped: u64) {
    counter!(names::TAIL_LAGGED_ITEMS).increment(skipped);
}

pub fn record_feeds_evicted(count: usize) {
    counter!(names::FEEDS_EVICTED).increment(count as u64);
}

pub fn feed_opened() {
    gauge!(names::FEEDS_OPEN).increment(1.0);
}

pub fn feed_closed() {
    gauge!(names::FEEDS_OPEN).decrement(1.0);
}

/// Helper struct for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

/// Initialize the Prometheus metrics exporter
/// Returns a handle to the metrics endpoint
pub fn init_metrics() -> anyhow::Result<metrics_exporter_prometheus::PrometheusHandle> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let handle = builder.install_recorder()?;
    Ok(handle)
}
