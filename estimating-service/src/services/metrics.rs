//! Prometheus metrics for estimating-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Store operation duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "estimating_db_query_duration_seconds",
        "Store operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Rollups by trigger.
pub static ROLLUPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "estimating_rollups_total",
        "Total number of estimate rollups by trigger",
        &["trigger"] // line_insert, line_update, line_delete, chapter_delete, price_sync, markup, recalculate
    )
    .expect("Failed to register rollups_total")
});

/// Line price syncs by outcome.
pub static PRICE_SYNC_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "estimating_price_sync_total",
        "Total number of line price syncs by outcome",
        &["outcome"]
    )
    .expect("Failed to register price_sync_total")
});

/// Exports by format.
pub static EXPORTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "estimating_exports_total",
        "Total number of estimate exports by format",
        &["format"]
    )
    .expect("Failed to register exports_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&ROLLUPS_TOTAL);
    Lazy::force(&PRICE_SYNC_TOTAL);
    Lazy::force(&EXPORTS_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
