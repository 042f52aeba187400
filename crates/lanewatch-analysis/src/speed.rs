//! Per-track speed estimation on the ground plane.

use std::collections::VecDeque;

use lanewatch_models::{BoundingBox, Point, SpeedReading};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{AnalysisError, AnalysisResult};
use crate::homography::Homography;

/// Speed estimation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    /// Maximum retained (position, time) samples per track
    pub history_capacity: usize,
    /// Samples required before a speed is reported (at least 2)
    pub min_samples: usize,
    /// Number of instantaneous speeds averaged into the reported value
    pub smoothing_window: usize,
    /// Ground-plane length (in projected units) of the real-world reference
    pub ground_reference_length: f64,
    /// Real-world length in meters of `ground_reference_length`
    pub real_world_length_m: f64,
    /// Factor from m/s to the reported unit (3.6 for km/h)
    pub unit_factor: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            history_capacity: 30,
            min_samples: 15,
            smoothing_window: 5,
            ground_reference_length: 500.0,
            real_world_length_m: 30.0,
            unit_factor: 3.6,
        }
    }
}

impl SpeedConfig {
    /// Validate the settings.
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.min_samples < 2 {
            return Err(AnalysisError::invalid_config("min_samples must be at least 2"));
        }
        if self.history_capacity < self.min_samples {
            return Err(AnalysisError::invalid_config(
                "history_capacity must be at least min_samples",
            ));
        }
        if self.smoothing_window == 0 {
            return Err(AnalysisError::invalid_config("smoothing_window must be positive"));
        }
        if !(self.ground_reference_length > 0.0 && self.ground_reference_length.is_finite()) {
            return Err(AnalysisError::invalid_config(
                "ground_reference_length must be positive",
            ));
        }
        if !(self.real_world_length_m > 0.0 && self.real_world_length_m.is_finite()) {
            return Err(AnalysisError::invalid_config("real_world_length_m must be positive"));
        }
        if !(self.unit_factor > 0.0 && self.unit_factor.is_finite()) {
            return Err(AnalysisError::invalid_config("unit_factor must be positive"));
        }
        Ok(())
    }

    /// Meters per ground-plane unit.
    fn meters_per_unit(&self) -> f64 {
        self.real_world_length_m / self.ground_reference_length
    }
}

/// Where a track's estimator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackPhase {
    /// No samples yet
    New,
    /// Fewer than `min_samples` samples
    Accumulating,
    /// Enough samples to report a speed
    Estimating,
}

/// Bounded position history and speed smoothing for one track.
#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    config: SpeedConfig,
    homography: Homography,
    /// (ground-plane point, timestamp in seconds), oldest first
    history: VecDeque<(Point, f64)>,
    recent_speeds: VecDeque<f64>,
}

impl SpeedEstimator {
    pub fn new(config: SpeedConfig, homography: Homography) -> Self {
        Self {
            history: VecDeque::with_capacity(config.history_capacity),
            recent_speeds: VecDeque::with_capacity(config.smoothing_window),
            config,
            homography,
        }
    }

    pub fn phase(&self) -> TrackPhase {
        match self.history.len() {
            0 => TrackPhase::New,
            n if n < self.config.min_samples => TrackPhase::Accumulating,
            _ => TrackPhase::Estimating,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.history.len()
    }

    /// Record a new observation and return the smoothed speed.
    ///
    /// Samples older than the newest retained one are ignored, as are
    /// points the homography cannot project.
    pub fn update(&mut self, bbox: &BoundingBox, timestamp: f64) -> SpeedReading {
        let Some(ground) = self.homography.project(&bbox.bottom_center()) else {
            trace!("Reference point has no ground-plane projection, skipping sample");
            return self.smoothed();
        };

        if !timestamp.is_finite() {
            return self.smoothed();
        }
        if let Some(&(_, newest)) = self.history.back() {
            if timestamp < newest {
                trace!(timestamp, newest, "Out-of-order sample ignored");
                return self.smoothed();
            }
        }

        self.history.push_back((ground, timestamp));
        while self.history.len() > self.config.history_capacity {
            self.history.pop_front();
        }

        self.estimate()
    }

    /// Compute an instantaneous speed over the retained window and fold it
    /// into the smoothing window.
    fn estimate(&mut self) -> SpeedReading {
        if self.history.len() < self.config.min_samples {
            return SpeedReading::Unknown;
        }

        let (Some(&(start, t0)), Some(&(end, t1))) = (self.history.front(), self.history.back())
        else {
            return SpeedReading::Unknown;
        };

        let elapsed = t1 - t0;
        if elapsed <= 0.0 {
            return SpeedReading::Unknown;
        }

        let meters = start.distance(&end) * self.config.meters_per_unit();
        let speed = meters / elapsed * self.config.unit_factor;

        self.recent_speeds.push_back(speed);
        while self.recent_speeds.len() > self.config.smoothing_window {
            self.recent_speeds.pop_front();
        }

        self.smoothed()
    }

    /// Mean of the recent instantaneous speeds.
    pub fn smoothed(&self) -> SpeedReading {
        if self.recent_speeds.is_empty() {
            return SpeedReading::Unknown;
        }
        let sum: f64 = self.recent_speeds.iter().sum();
        SpeedReading::Known(sum / self.recent_speeds.len() as f64)
    }
}
