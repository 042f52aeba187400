//! Lane assignment results.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Label used for the direction of a detection outside every lane.
pub const UNKNOWN_DIRECTION: &str = "Unknown";

/// Label used for the lane of a detection outside every lane.
pub const NO_LANE: &str = "None";

/// Travel direction label configured for a lane (e.g. a destination name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Direction(String);

impl Direction {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Placeholder direction for violations.
    pub fn unknown() -> Self {
        Self(UNKNOWN_DIRECTION.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of classifying a detection against the configured lanes.
///
/// Computed fresh for every detection; never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaneAssignment {
    /// Inside lane `index` (0-based, in configured order).
    Lane { index: usize, direction: Direction },
    /// Outside every lane polygon.
    Violation,
}

impl LaneAssignment {
    pub fn lane(index: usize, direction: Direction) -> Self {
        Self::Lane { index, direction }
    }

    pub fn is_violation(&self) -> bool {
        matches!(self, LaneAssignment::Violation)
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            LaneAssignment::Lane { index, .. } => Some(*index),
            LaneAssignment::Violation => None,
        }
    }

    /// Human-readable lane label: `"Lane 1"` for index 0, `"None"` for violations.
    pub fn lane_label(&self) -> String {
        match self {
            LaneAssignment::Lane { index, .. } => format!("Lane {}", index + 1),
            LaneAssignment::Violation => NO_LANE.to_string(),
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            LaneAssignment::Lane { direction, .. } => direction.clone(),
            LaneAssignment::Violation => Direction::unknown(),
        }
    }
}
