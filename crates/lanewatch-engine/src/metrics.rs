//! Frame loop metrics.

use metrics::counter;

use crate::processor::FrameReport;

/// Metric name constants for consistency.
pub mod names {
    /// Frames processed.
    pub const FRAMES_TOTAL: &str = "lanewatch_frames_total";

    /// Detections turned into traffic events.
    pub const EVENTS_TOTAL: &str = "lanewatch_events_total";

    /// Snapshots handed to delivery.
    pub const CAPTURES_TOTAL: &str = "lanewatch_captures_total";

    /// Detections dropped for low confidence.
    pub const SKIPPED_DETECTIONS_TOTAL: &str = "lanewatch_skipped_detections_total";
}

/// Record one processed frame.
pub fn record_frame(report: &FrameReport) {
    counter!(names::FRAMES_TOTAL).increment(1);
    counter!(names::EVENTS_TOTAL).increment(report.events as u64);
    counter!(names::SKIPPED_DETECTIONS_TOTAL).increment(report.skipped as u64);
}

/// Record a capture that reached the delivery pipeline.
pub fn record_capture() {
    counter!(names::CAPTURES_TOTAL).increment(1);
}
