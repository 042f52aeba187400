//! One-shot snapshot decision per track.

use lanewatch_analysis::LaneClassifier;
use lanewatch_models::{BoundingBox, LaneAssignment, TrackId};

use crate::registry::TrackRegistry;

/// Decides the single moment a track is photographed.
///
/// Rules, in order:
/// 1. a track that was already captured is never captured again;
/// 2. a violation is captured on its first observation;
/// 3. a track in a lane is captured once its reference point enters that
///    lane's sweet spot.
///
/// A `true` answer has already armed the track's capture record. If the
/// snapshot then cannot be taken, the caller must disarm it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureGate;

impl CaptureGate {
    pub fn new() -> Self {
        Self
    }

    pub fn should_capture(
        &self,
        registry: &TrackRegistry,
        classifier: &LaneClassifier,
        track: TrackId,
        lane: &LaneAssignment,
        bbox: &BoundingBox,
    ) -> bool {
        if registry.is_captured(track) {
            return false;
        }

        let qualifies = match lane {
            LaneAssignment::Violation => true,
            LaneAssignment::Lane { index, .. } => classifier.in_sweet_spot(*index, bbox),
        };

        qualifies && registry.try_arm_capture(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanewatch_analysis::{Homography, LaneZone, SpeedConfig};
    use lanewatch_models::{Direction, Polygon};

    fn setup() -> (TrackRegistry, LaneClassifier) {
        let classifier = LaneClassifier::new(vec![LaneZone::new(
            Polygon::from_pairs(&[(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)]),
            Direction::new("North"),
        )
        .with_sweet_spot(Polygon::from_pairs(&[(40.0, 40.0), (60.0, 40.0), (60.0, 60.0), (40.0, 60.0)]))]);
        (TrackRegistry::new(SpeedConfig::default(), Homography::identity()), classifier)
    }

    fn bbox_at(x: f64, y: f64) -> BoundingBox {
        BoundingBox::new(x - 5.0, y - 10.0, x + 5.0, y)
    }

    #[test]
    fn test_sweet_spot_entry_captures_once() {
        let (registry, classifier) = setup();
        let gate = CaptureGate::new();
        let track = TrackId(1);

        let outside = bbox_at(20.0, 20.0);
        let lane = classifier.classify(&outside);
        assert!(!gate.should_capture(&registry, &classifier, track, &lane, &outside));

        let inside = bbox_at(50.0, 50.0);
        let lane = classifier.classify(&inside);
        assert!(gate.should_capture(&registry, &classifier, track, &lane, &inside));
        for _ in 0..4 {
            assert!(!gate.should_capture(&registry, &classifier, track, &lane, &inside));
        }
    }

    #[test]
    fn test_violation_captures_on_first_observation() {
        let (registry, classifier) = setup();
        let gate = CaptureGate::new();
        let bbox = bbox_at(500.0, 500.0);

        assert!(gate.should_capture(&registry, &classifier, TrackId(2), &LaneAssignment::Violation, &bbox));
        assert!(!gate.should_capture(&registry, &classifier, TrackId(2), &LaneAssignment::Violation, &bbox));
    }

    #[test]
    fn test_captured_track_is_not_recaptured_as_violation() {
        let (registry, classifier) = setup();
        let gate = CaptureGate::new();
        let inside = bbox_at(50.0, 50.0);
        let lane = classifier.classify(&inside);

        assert!(gate.should_capture(&registry, &classifier, TrackId(3), &lane, &inside));
        assert!(!gate.should_capture(&registry, &classifier, TrackId(3), &LaneAssignment::Violation, &inside));
    }

    #[test]
    fn test_disarmed_capture_is_retried() {
        let (registry, classifier) = setup();
        let gate = CaptureGate::new();
        let bbox = bbox_at(500.0, 500.0);

        assert!(gate.should_capture(&registry, &classifier, TrackId(4), &LaneAssignment::Violation, &bbox));
        registry.disarm_capture(TrackId(4));
        assert!(gate.should_capture(&registry, &classifier, TrackId(4), &LaneAssignment::Violation, &bbox));
    }
}
