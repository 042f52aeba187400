//! Structured track logging utilities.
//!
//! Provides consistent, structured logging for a track's capture lifecycle
//! with tracing spans and contextual information.

use lanewatch_models::{LaneAssignment, TrackId};
use tracing::{info, warn, Span};

/// Track logger for structured logging with consistent formatting.
///
/// Every message carries the track ID and lane label.
#[derive(Debug, Clone)]
pub struct TrackLogger {
    track_id: TrackId,
    lane: String,
}

impl TrackLogger {
    /// Create a new logger for a track in its current lane.
    pub fn new(track_id: TrackId, lane: &LaneAssignment) -> Self {
        Self {
            track_id,
            lane: lane.lane_label(),
        }
    }

    /// Log that the capture gate fired.
    pub fn log_capture(&self, message: &str) {
        info!(
            track_id = %self.track_id,
            lane = %self.lane,
            "Capture: {}", message
        );
    }

    /// Log a recoverable problem with this track.
    pub fn log_warning(&self, message: &str) {
        warn!(
            track_id = %self.track_id,
            lane = %self.lane,
            "Track warning: {}", message
        );
    }

    /// Log a violation.
    pub fn log_violation(&self, class_name: &str) {
        warn!(
            track_id = %self.track_id,
            lane = %self.lane,
            class_name,
            "Lane violation detected"
        );
    }

    pub fn track_id(&self) -> TrackId {
        self.track_id
    }

    pub fn lane(&self) -> &str {
        &self.lane
    }

    /// Create a tracing span for this track.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "track",
            track_id = %self.track_id,
            lane = %self.lane
        )
    }
}
