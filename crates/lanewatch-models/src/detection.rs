//! Tracked detections produced by the upstream detector/tracker.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

/// Stable identifier assigned by the upstream tracker for a track's lifetime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl TrackId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TrackId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// One tracked object in one frame. Read-only input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedDetection {
    pub track_id: TrackId,
    pub bbox: BoundingBox,
    pub class_name: String,
    /// Detector confidence in `[0, 1]`
    pub confidence: f64,
}

impl TrackedDetection {
    pub fn new(
        track_id: impl Into<TrackId>,
        bbox: BoundingBox,
        class_name: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            track_id: track_id.into(),
            bbox,
            class_name: class_name.into(),
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_from_tracker_json() {
        let json = r#"{"track_id": 7, "bbox": [10, 20, 30, 40], "class_name": "car", "confidence": 0.92}"#;
        let det: TrackedDetection = serde_json::from_str(json).unwrap();

        assert_eq!(det.track_id, TrackId(7));
        assert_eq!(det.bbox, BoundingBox::new(10.0, 20.0, 30.0, 40.0));
        assert_eq!(det.class_name, "car");
    }

    #[test]
    fn test_track_id_display() {
        assert_eq!(TrackId::new(42).to_string(), "42");
    }
}
