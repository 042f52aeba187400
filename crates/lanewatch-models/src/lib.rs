//! Shared data models for the Lanewatch traffic pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Image-plane geometry (points, polygons, bounding boxes)
//! - Tracked detections handed over by the upstream tracker
//! - Lane assignments and speed readings
//! - Traffic events and the remote ingestion payload

pub mod detection;
pub mod event;
pub mod geometry;
pub mod lane;

// Re-export common types
pub use detection::{TrackId, TrackedDetection};
pub use event::{payload_schema, IngestPayload, SpeedReading, TrafficEvent, NOT_AVAILABLE};
pub use geometry::{BoundingBox, Point, Polygon};
pub use lane::{Direction, LaneAssignment};
