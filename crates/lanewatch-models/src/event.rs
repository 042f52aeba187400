//! Traffic events and the remote ingestion payload.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::gen::SchemaGenerator;
use schemars::schema::{RootSchema, Schema};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::detection::{TrackId, TrackedDetection};
use crate::lane::LaneAssignment;

/// Placeholder written wherever a speed is not available.
pub const NOT_AVAILABLE: &str = "N/A";

/// Speed estimate in km/h, or `Unknown` while the estimator has too little
/// history (or the elapsed time is zero).
///
/// Serializes as a JSON number or the string `"N/A"`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SpeedReading {
    Known(f64),
    #[default]
    Unknown,
}

impl SpeedReading {
    pub fn kmh(&self) -> Option<f64> {
        match self {
            SpeedReading::Known(v) => Some(*v),
            SpeedReading::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, SpeedReading::Known(_))
    }
}

impl fmt::Display for SpeedReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeedReading::Known(v) => write!(f, "{:.2}", v),
            SpeedReading::Unknown => f.write_str(NOT_AVAILABLE),
        }
    }
}

/// Wire representation of [`SpeedReading`].
#[derive(Deserialize, JsonSchema)]
#[serde(untagged)]
#[allow(dead_code)]
enum SpeedRepr {
    Kmh(f64),
    Placeholder(String),
}

impl Serialize for SpeedReading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SpeedReading::Known(v) => serializer.serialize_f64(*v),
            SpeedReading::Unknown => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

impl<'de> Deserialize<'de> for SpeedReading {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match SpeedRepr::deserialize(deserializer)? {
            SpeedRepr::Kmh(v) => SpeedReading::Known(v),
            SpeedRepr::Placeholder(_) => SpeedReading::Unknown,
        })
    }
}

impl JsonSchema for SpeedReading {
    fn schema_name() -> String {
        "SpeedReading".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        SpeedRepr::json_schema(gen)
    }
}

/// `"Yes"` / `"No"` encoding used by the ingestion service for the violation flag.
mod yes_no {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "Yes" } else { "No" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match String::deserialize(deserializer)?.as_str() {
            "Yes" => Ok(true),
            "No" => Ok(false),
            other => Err(D::Error::custom(format!("expected \"Yes\" or \"No\", got {other:?}"))),
        }
    }
}

/// A classified detection. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrafficEvent {
    pub track_id: TrackId,
    pub class_name: String,
    /// `"Lane N"` (1-based) or `"None"` for violations
    pub lane: String,
    pub direction: String,
    pub speed: SpeedReading,
    #[serde(with = "yes_no")]
    #[schemars(with = "String")]
    pub violation: bool,
    /// `[x1, y1, x2, y2]` in image pixels
    pub bbox: [f64; 4],
    pub confidence: f64,
    /// Wall-clock time the detection was classified
    pub observed_at: DateTime<Utc>,
}

impl TrafficEvent {
    /// Build an event from a detection and its derived attributes.
    pub fn new(
        detection: &TrackedDetection,
        lane: &LaneAssignment,
        speed: SpeedReading,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            track_id: detection.track_id,
            class_name: detection.class_name.clone(),
            lane: lane.lane_label(),
            direction: lane.direction().to_string(),
            speed,
            violation: lane.is_violation(),
            bbox: detection.bbox.as_array(),
            confidence: detection.confidence,
            observed_at,
        }
    }

    /// File stem shared by the fallback image and data files.
    ///
    /// One-second granularity, e.g. `vehicle_12_20240131_235959`.
    pub fn file_stem(&self) -> String {
        format!(
            "vehicle_{}_{}",
            self.track_id,
            self.observed_at.format("%Y%m%d_%H%M%S")
        )
    }
}

/// Body posted to the remote ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IngestPayload {
    pub detection_data: TrafficEvent,
    /// Base64-encoded JPEG snapshot
    pub snapshot: String,
    /// ISO-8601 submission timestamp
    pub timestamp: String,
}

/// JSON schema of [`IngestPayload`], for implementers of the remote service.
pub fn payload_schema() -> RootSchema {
    schemars::schema_for!(IngestPayload)
}
