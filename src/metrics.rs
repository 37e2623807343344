//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Merge outcomes (inserted, updated, skipped)
//! - Conflict detections and safe replays
//! - Placeholder creation
//! - Merge latency
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `dbsync_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Histograms track distributions (duration)
//!
//! # Usage
//!
//! ```rust,no_run
//! use dbsync_engine::metrics;
//! use std::time::Duration;
//!
//! // In the merge engine after applying a change
//! metrics::record_merge_applied("Person", "insert");
//! metrics::record_merge_duration("Person", Duration::from_millis(3));
//! ```

use metrics::{counter, histogram};
use std::time::Duration;

/// Record a successfully applied change.
pub fn record_merge_applied(kind: &str, outcome: &'static str) {
    counter!("dbsync_merges_applied_total", "kind" => kind.to_string(), "outcome" => outcome)
        .increment(1);
}

/// Record a change skipped because its kind is excluded.
pub fn record_merge_skipped(kind: &str) {
    counter!("dbsync_merges_skipped_total", "kind" => kind.to_string()).increment(1);
}

/// Record a detected conflict (change parked for manual resolution).
pub fn record_conflict(kind: &str) {
    counter!("dbsync_conflicts_total", "kind" => kind.to_string()).increment(1);
}

/// Record a safe replay (incoming payload already merged, reapplied as-is).
pub fn record_safe_replay(kind: &str) {
    counter!("dbsync_safe_replays_total", "kind" => kind.to_string()).increment(1);
}

/// Record a delete for a record that never existed locally.
pub fn record_delete_ignored(kind: &str) {
    counter!("dbsync_deletes_ignored_total", "kind" => kind.to_string()).increment(1);
}

/// Record creation of a placeholder for a forward reference.
pub fn record_placeholder_created(kind: &str) {
    counter!("dbsync_placeholders_created_total", "kind" => kind.to_string()).increment(1);
}

/// Record end-to-end merge latency for one change.
pub fn record_merge_duration(kind: &str, duration: Duration) {
    histogram!("dbsync_merge_duration_seconds", "kind" => kind.to_string())
        .record(duration.as_secs_f64());
}
