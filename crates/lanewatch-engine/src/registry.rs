//! Per-track state shared by the frame loop: speed history, capture records
//! and lane counters.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use lanewatch_analysis::{Homography, SpeedConfig, SpeedEstimator};
use lanewatch_models::{SpeedReading, TrackId, TrackedDetection};
use serde::Serialize;
use tracing::debug;

/// Totals for one lane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LaneTotals {
    /// 0-based lane index
    pub lane: usize,
    pub total: u64,
    pub classes: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
struct LaneTally {
    members: HashSet<TrackId>,
    total: u64,
    classes: BTreeMap<String, u64>,
}

/// Distinct-vehicle counts per lane and per class.
///
/// A track counts once per lane, the first time it is seen there. Counts
/// only ever grow; forgetting a track drops its membership, not its count.
#[derive(Debug, Default)]
pub struct LaneCounters {
    lanes: BTreeMap<usize, LaneTally>,
}

impl LaneCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `track` in `lane` unless already counted there. Returns whether
    /// this call incremented the counters.
    pub fn record(&mut self, lane: usize, track: TrackId, class_name: &str) -> bool {
        let tally = self.lanes.entry(lane).or_default();
        if !tally.members.insert(track) {
            return false;
        }
        tally.total += 1;
        *tally.classes.entry(class_name.to_string()).or_insert(0) += 1;
        true
    }

    pub fn total(&self, lane: usize) -> u64 {
        self.lanes.get(&lane).map_or(0, |t| t.total)
    }

    pub fn class_totals(&self, lane: usize) -> BTreeMap<String, u64> {
        self.lanes.get(&lane).map(|t| t.classes.clone()).unwrap_or_default()
    }

    /// Drop `track` from every lane's membership set.
    pub fn forget(&mut self, track: TrackId) {
        for tally in self.lanes.values_mut() {
            tally.members.remove(&track);
        }
    }

    pub fn totals(&self) -> Vec<LaneTotals> {
        self.lanes
            .iter()
            .map(|(&lane, tally)| LaneTotals {
                lane,
                total: tally.total,
                classes: tally.classes.clone(),
            })
            .collect()
    }
}

#[derive(Debug)]
struct TrackEntry {
    speed: SpeedEstimator,
    captured: bool,
    /// Frame time of the last observation; `None` until first observed
    last_seen: Option<f64>,
}

#[derive(Debug, Default)]
struct RegistryState {
    tracks: HashMap<TrackId, TrackEntry>,
    counters: LaneCounters,
}

/// Point-in-time view of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    pub tracks: usize,
    pub captured: usize,
    pub lanes: Vec<LaneTotals>,
}

/// Owned, synchronized per-track state.
///
/// Every operation takes the single internal lock, so arming a capture is
/// atomic with respect to any other caller.
#[derive(Debug)]
pub struct TrackRegistry {
    speed_config: SpeedConfig,
    homography: Homography,
    state: Mutex<RegistryState>,
}

impl TrackRegistry {
    pub fn new(speed_config: SpeedConfig, homography: Homography) -> Self {
        Self {
            speed_config,
            homography,
            state: Mutex::new(RegistryState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn new_entry(&self) -> TrackEntry {
        TrackEntry {
            speed: SpeedEstimator::new(self.speed_config.clone(), self.homography),
            captured: false,
            last_seen: None,
        }
    }

    /// Feed a detection to its track's speed estimator and mark it seen at `t`.
    pub fn observe(&self, detection: &TrackedDetection, t: f64) -> SpeedReading {
        let mut state = self.state();
        let entry = state
            .tracks
            .entry(detection.track_id)
            .or_insert_with(|| self.new_entry());

        if t.is_finite() {
            entry.last_seen = Some(entry.last_seen.map_or(t, |seen| seen.max(t)));
        }
        entry.speed.update(&detection.bbox, t)
    }

    /// Flip the track's capture record from not captured to captured.
    /// Returns `false` if it was already captured.
    pub fn try_arm_capture(&self, track: TrackId) -> bool {
        let mut state = self.state();
        let entry = state.tracks.entry(track).or_insert_with(|| self.new_entry());
        if entry.captured {
            return false;
        }
        entry.captured = true;
        true
    }

    /// Undo an armed capture whose snapshot could not be taken.
    pub fn disarm_capture(&self, track: TrackId) {
        if let Some(entry) = self.state().tracks.get_mut(&track) {
            entry.captured = false;
        }
    }

    pub fn is_captured(&self, track: TrackId) -> bool {
        self.state().tracks.get(&track).is_some_and(|e| e.captured)
    }

    /// Count the track in a lane, first time only.
    pub fn count(&self, track: TrackId, lane: usize, class_name: &str) -> bool {
        self.state().counters.record(lane, track, class_name)
    }

    pub fn lane_total(&self, lane: usize) -> u64 {
        self.state().counters.total(lane)
    }

    pub fn lane_totals(&self) -> Vec<LaneTotals> {
        self.state().counters.totals()
    }

    pub fn class_totals(&self, lane: usize) -> BTreeMap<String, u64> {
        self.state().counters.class_totals(lane)
    }

    pub fn track_count(&self) -> usize {
        self.state().tracks.len()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state();
        RegistrySnapshot {
            tracks: state.tracks.len(),
            captured: state.tracks.values().filter(|e| e.captured).count(),
            lanes: state.counters.totals(),
        }
    }

    /// Remove tracks last seen more than `idle_timeout` before `now`, along
    /// with their capture record and lane membership. A later detection with
    /// the same ID starts over as a new vehicle.
    pub fn evict_idle(&self, now: f64, idle_timeout: Duration) -> usize {
        let timeout = idle_timeout.as_secs_f64();
        let mut state = self.state();

        let idle: Vec<TrackId> = state
            .tracks
            .iter()
            .filter(|(_, e)| e.last_seen.is_some_and(|seen| now - seen > timeout))
            .map(|(&id, _)| id)
            .collect();

        for track in &idle {
            state.tracks.remove(track);
            state.counters.forget(*track);
        }

        if !idle.is_empty() {
            debug!(evicted = idle.len(), remaining = state.tracks.len(), "Evicted idle tracks");
        }
        idle.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use lanewatch_models::BoundingBox;

    fn registry() -> TrackRegistry {
        let config = SpeedConfig {
            min_samples: 2,
            history_capacity: 4,
            ..SpeedConfig::default()
        };
        TrackRegistry::new(config, Homography::identity())
    }

    fn detection(track: u64, y: f64) -> TrackedDetection {
        TrackedDetection::new(track, BoundingBox::new(0.0, y - 10.0, 10.0, y), "car", 0.9)
    }

    #[test]
    fn test_capture_arms_once() {
        let reg = registry();
        let track = TrackId(7);
        assert!(reg.try_arm_capture(track));
        assert!(!reg.try_arm_capture(track));
        assert!(reg.is_captured(track));
    }

    #[test]
    fn test_disarm_allows_retry() {
        let reg = registry();
        let track = TrackId(7);
        assert!(reg.try_arm_capture(track));
        reg.disarm_capture(track);
        assert!(!reg.is_captured(track));
        assert!(reg.try_arm_capture(track));
    }

    #[test]
    fn test_concurrent_arming_has_one_winner() {
        let reg = Arc::new(registry());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || (0..50).filter(|&t| reg.try_arm_capture(TrackId(t))).count())
            })
            .collect();

        let wins: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(wins, 50);
    }

    #[test]
    fn test_lane_counting_is_idempotent() {
        let reg = registry();
        assert!(reg.count(TrackId(1), 0, "car"));
        assert!(!reg.count(TrackId(1), 0, "car"));
        assert!(reg.count(TrackId(2), 0, "bus"));
        // Same track in a different lane counts there too.
        assert!(reg.count(TrackId(1), 1, "car"));

        assert_eq!(reg.lane_total(0), 2);
        assert_eq!(reg.lane_total(1), 1);
        assert_eq!(reg.class_totals(0).get("bus"), Some(&1));
        assert_eq!(reg.lane_total(5), 0);
    }

    #[test]
    fn test_observe_reports_speed_after_min_samples() {
        let reg = registry();
        assert_eq!(reg.observe(&detection(1, 0.0), 0.0), SpeedReading::Unknown);
        assert!(reg.observe(&detection(1, 500.0), 1.0).is_known());
        // Tracks are independent.
        assert_eq!(reg.observe(&detection(2, 0.0), 1.0), SpeedReading::Unknown);
        assert_eq!(reg.track_count(), 2);
    }

    #[test]
    fn test_evict_idle_removes_state_but_keeps_counts() {
        let reg = registry();
        reg.observe(&detection(1, 0.0), 0.0);
        reg.count(TrackId(1), 0, "car");
        reg.try_arm_capture(TrackId(1));
        reg.observe(&detection(2, 0.0), 9.0);

        let evicted = reg.evict_idle(10.0, Duration::from_secs(5));
        assert_eq!(evicted, 1);
        assert_eq!(reg.track_count(), 1);
        assert!(!reg.is_captured(TrackId(1)));

        // Lane total stays; a reused ID counts again as a new vehicle.
        assert_eq!(reg.lane_total(0), 1);
        assert!(reg.count(TrackId(1), 0, "car"));
        assert_eq!(reg.lane_total(0), 2);
        assert!(reg.try_arm_capture(TrackId(1)));
    }

    #[test]
    fn test_unobserved_track_is_never_evicted() {
        let reg = registry();
        reg.try_arm_capture(TrackId(3));
        assert_eq!(reg.evict_idle(1e9, Duration::from_secs(1)), 0);
        assert!(reg.is_captured(TrackId(3)));
    }

    #[test]
    fn test_snapshot() {
        let reg = registry();
        reg.observe(&detection(1, 0.0), 0.0);
        reg.count(TrackId(1), 1, "truck");
        reg.try_arm_capture(TrackId(1));

        let snap = reg.snapshot();
        assert_eq!(snap.tracks, 1);
        assert_eq!(snap.captured, 1);
        assert_eq!(snap.lanes[0].lane, 1);
        assert_eq!(snap.lanes[0].classes.get("truck"), Some(&1));
    }
}
