//! Lane classification by polygon containment.

use lanewatch_models::{BoundingBox, Direction, LaneAssignment, Polygon};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One configured lane: its image-plane region, its travel direction and an
/// optional sweet-spot sub-region used to pick the snapshot moment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneZone {
    pub polygon: Polygon,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweet_spot: Option<Polygon>,
}

impl LaneZone {
    pub fn new(polygon: Polygon, direction: Direction) -> Self {
        Self {
            polygon,
            direction,
            sweet_spot: None,
        }
    }

    pub fn with_sweet_spot(mut self, sweet_spot: Polygon) -> Self {
        self.sweet_spot = Some(sweet_spot);
        self
    }
}

/// Assigns detections to lanes.
///
/// The reference point of a detection is the bottom-center of its bounding
/// box. Lanes are tested in configured order and the first lane containing
/// the point wins, so overlapping lanes resolve to the one listed first.
/// A point inside no lane, a non-finite box, or a lane whose polygon is
/// degenerate all yield [`LaneAssignment::Violation`].
#[derive(Debug, Clone, Default)]
pub struct LaneClassifier {
    zones: Vec<LaneZone>,
}

impl LaneClassifier {
    pub fn new(zones: Vec<LaneZone>) -> Self {
        for (index, zone) in zones.iter().enumerate() {
            if zone.polygon.is_degenerate() {
                warn!(lane = index + 1, "Lane polygon is degenerate and will never match");
            }
        }
        Self { zones }
    }

    pub fn zones(&self) -> &[LaneZone] {
        &self.zones
    }

    pub fn lane_count(&self) -> usize {
        self.zones.len()
    }

    /// Classify a bounding box. Pure and deterministic.
    pub fn classify(&self, bbox: &BoundingBox) -> LaneAssignment {
        if !bbox.is_finite() {
            return LaneAssignment::Violation;
        }

        let point = bbox.bottom_center();
        self.zones
            .iter()
            .position(|zone| zone.polygon.contains(&point))
            .map(|index| LaneAssignment::lane(index, self.zones[index].direction.clone()))
            .unwrap_or(LaneAssignment::Violation)
    }

    /// Whether the box's reference point lies in the sweet spot of `lane_index`.
    ///
    /// False when the lane has no sweet spot or does not exist.
    pub fn in_sweet_spot(&self, lane_index: usize, bbox: &BoundingBox) -> bool {
        self.zones
            .get(lane_index)
            .and_then(|zone| zone.sweet_spot.as_ref())
            .is_some_and(|spot| spot.contains(&bbox.bottom_center()))
    }
}
