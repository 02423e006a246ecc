// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation.
//!
//! Uses the `metrics` crate for backend-agnostic collection; the host
//! application chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `om_engine_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `model`: model name
//! - `operation`: all, count, update, delete / create, drop / up, down
//! - `status`: success, error

use std::time::Duration;

use metrics::{counter, histogram};

/// Record one executed find-query operation.
pub fn record_query(model: &str, operation: &str) {
    counter!(
        "om_engine_queries_total",
        "model" => model.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record find-query latency.
pub fn record_query_latency(duration: Duration) {
    histogram!("om_engine_query_seconds").record(duration.as_secs_f64());
}

/// Record a schema-index create/drop.
pub fn record_index_operation(action: &str, success: bool) {
    counter!(
        "om_engine_index_operations_total",
        "action" => action.to_string(),
        "status" => if success { "success" } else { "error" }.to_string()
    )
    .increment(1);
}

/// Record a data-migration apply/rollback.
pub fn record_data_migration(direction: &str, success: bool) {
    counter!(
        "om_engine_data_migrations_total",
        "direction" => direction.to_string(),
        "status" => if success { "success" } else { "error" }.to_string()
    )
    .increment(1);
}

/// Record records processed by a batch transform.
pub fn record_records_processed(model: &str, count: u64) {
    counter!(
        "om_engine_records_processed_total",
        "model" => model.to_string()
    )
    .increment(count);
}
