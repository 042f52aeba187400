//! Per-detection analysis for the traffic pipeline.
//!
//! This crate provides:
//! - Lane classification by polygon containment
//! - Image-to-ground-plane homography
//! - Per-track speed estimation with bounded history and smoothing
//!
//! Everything here is synchronous and free of I/O.

pub mod classifier;
pub mod error;
pub mod homography;
pub mod speed;

pub use classifier::{LaneClassifier, LaneZone};
pub use error::{AnalysisError, AnalysisResult};
pub use homography::Homography;
pub use speed::{SpeedConfig, SpeedEstimator, TrackPhase};
