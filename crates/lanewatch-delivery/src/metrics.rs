//! Delivery metrics collection.
//!
//! Provides standardized metrics for monitoring event delivery:
//! - Terminal outcomes by kind
//! - Delivery latency histogram
//! - Fallback persistence failures (data loss)
//! - Queue overflows

use std::time::Duration;

use metrics::{counter, histogram};

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Total terminal delivery outcomes by outcome.
    pub const DELIVERIES_TOTAL: &str = "lanewatch_deliveries_total";

    /// Time from job pickup to terminal outcome, in seconds.
    pub const DELIVERY_LATENCY_SECONDS: &str = "lanewatch_delivery_latency_seconds";

    /// Jobs lost because the local fallback write failed.
    pub const FALLBACK_PERSIST_FAILURES_TOTAL: &str = "lanewatch_fallback_persist_failures_total";

    /// Jobs diverted because the queue was full.
    pub const QUEUE_OVERFLOW_TOTAL: &str = "lanewatch_queue_overflow_total";
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record a terminal outcome (`delivered`, `persisted` or `lost`).
pub fn record_outcome(outcome: &'static str, latency: Duration) {
    counter!(names::DELIVERIES_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::DELIVERY_LATENCY_SECONDS, "outcome" => outcome).record(latency.as_secs_f64());
}

/// Record a failed fallback write.
pub fn record_persist_failure() {
    counter!(names::FALLBACK_PERSIST_FAILURES_TOTAL).increment(1);
}

/// Record a submission that found the queue full.
pub fn record_overflow() {
    counter!(names::QUEUE_OVERFLOW_TOTAL).increment(1);
}

// =============================================================================
// Tests
// =============================================================================
