//! Per-frame processing: classify, estimate speed, count, capture, log.

use std::sync::Arc;

use chrono::Utc;
use lanewatch_analysis::LaneClassifier;
use lanewatch_delivery::{DeliveryJob, JobSink, SubmitOutcome};
use lanewatch_models::{LaneAssignment, SpeedReading, TrackedDetection, TrafficEvent};
use tracing::{debug, error, warn};

use crate::capture::CaptureGate;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::event_log::EventLog;
use crate::frame::FrameInput;
use crate::logging::TrackLogger;
use crate::metrics;
use crate::registry::TrackRegistry;
use crate::snapshot::extract_snapshot;

/// Everything a [`FrameProcessor`] needs.
pub struct ProcessorParts {
    pub classifier: LaneClassifier,
    pub registry: Arc<TrackRegistry>,
    pub gate: CaptureGate,
    pub event_log: EventLog,
    pub delivery: Arc<dyn JobSink>,
    pub config: EngineConfig,
}

/// Summary of one processed frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Detections turned into events
    pub events: usize,
    /// Snapshots handed to delivery
    pub captures: usize,
    /// Events outside every lane
    pub violations: usize,
    /// Detections dropped for low confidence
    pub skipped: usize,
}

struct DetectionOutcome {
    violation: bool,
    captured: bool,
}

/// Single-threaded frame loop body.
///
/// Errors never escape: a failing detection is logged and the rest of the
/// frame still runs.
pub struct FrameProcessor {
    classifier: LaneClassifier,
    registry: Arc<TrackRegistry>,
    gate: CaptureGate,
    event_log: EventLog,
    delivery: Arc<dyn JobSink>,
    config: EngineConfig,
}

impl FrameProcessor {
    pub fn new(parts: ProcessorParts) -> Self {
        Self {
            classifier: parts.classifier,
            registry: parts.registry,
            gate: parts.gate,
            event_log: parts.event_log,
            delivery: parts.delivery,
            config: parts.config,
        }
    }

    pub fn registry(&self) -> &Arc<TrackRegistry> {
        &self.registry
    }

    pub fn process_frame(&mut self, frame: &FrameInput) -> FrameReport {
        let mut report = FrameReport::default();

        for detection in &frame.detections {
            if detection.confidence <= self.config.min_confidence {
                report.skipped += 1;
                continue;
            }

            match self.process_detection(frame, detection) {
                Ok(outcome) => {
                    report.events += 1;
                    report.violations += usize::from(outcome.violation);
                    report.captures += usize::from(outcome.captured);
                }
                Err(e) => {
                    warn!(track_id = %detection.track_id, error = %e, "Detection processing failed");
                }
            }
        }

        if let Err(e) = self.event_log.flush() {
            error!("Failed to flush event log {}: {}", self.event_log.path().display(), e);
        }

        if let Some(idle_timeout) = self.config.idle_timeout {
            self.registry.evict_idle(frame.timestamp, idle_timeout);
        }

        metrics::record_frame(&report);
        debug!(
            timestamp = frame.timestamp,
            events = report.events,
            captures = report.captures,
            violations = report.violations,
            "Frame processed"
        );
        report
    }

    fn process_detection(
        &mut self,
        frame: &FrameInput,
        detection: &TrackedDetection,
    ) -> EngineResult<DetectionOutcome> {
        let lane = self.classifier.classify(&detection.bbox);

        // Speed history follows every detection; violations report N/A.
        let speed = self.registry.observe(detection, frame.timestamp);
        let speed = if lane.is_violation() { SpeedReading::Unknown } else { speed };

        let event = TrafficEvent::new(detection, &lane, speed, Utc::now());

        if let Some(index) = lane.index() {
            self.registry.count(detection.track_id, index, &detection.class_name);
        }

        let captured = self.try_capture(frame, detection, &lane, &event);

        self.event_log.append(&event)?;

        Ok(DetectionOutcome {
            violation: lane.is_violation(),
            captured,
        })
    }

    fn try_capture(
        &self,
        frame: &FrameInput,
        detection: &TrackedDetection,
        lane: &LaneAssignment,
        event: &TrafficEvent,
    ) -> bool {
        let track = detection.track_id;
        if !self
            .gate
            .should_capture(&self.registry, &self.classifier, track, lane, &detection.bbox)
        {
            return false;
        }

        let logger = TrackLogger::new(track, lane);

        let snapshot = frame
            .image
            .as_ref()
            .ok_or_else(|| EngineError::empty_crop("frame has no image"))
            .and_then(|image| extract_snapshot(image, &detection.bbox, self.config.snapshot_padding));

        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.registry.disarm_capture(track);
                logger.log_warning(&format!("snapshot unavailable, retrying on a later frame: {e}"));
                return false;
            }
        };

        if lane.is_violation() {
            logger.log_violation(&detection.class_name);
        }

        match self.delivery.submit(DeliveryJob::new(event.clone(), snapshot)) {
            SubmitOutcome::Queued => logger.log_capture("queued for delivery"),
            SubmitOutcome::OverflowPersisted => logger.log_capture("delivery queue full, stored locally"),
            SubmitOutcome::Closed => {
                logger.log_warning("delivery pipeline is closed, capture dropped");
                return false;
            }
        }

        metrics::record_capture();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use image::RgbImage;
    use lanewatch_analysis::{Homography, LaneZone, SpeedConfig};
    use lanewatch_models::{BoundingBox, Direction, Polygon, TrackId};
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingSink {
        jobs: Mutex<Vec<DeliveryJob>>,
    }

    impl JobSink for RecordingSink {
        fn submit(&self, job: DeliveryJob) -> SubmitOutcome {
            self.jobs.lock().unwrap().push(job);
            SubmitOutcome::Queued
        }
    }

    fn processor(dir: &TempDir, sink: Arc<RecordingSink>) -> FrameProcessor {
        processor_with(dir, sink, EngineConfig::default())
    }

    fn processor_with(dir: &TempDir, sink: Arc<RecordingSink>, config: EngineConfig) -> FrameProcessor {
        let classifier = LaneClassifier::new(vec![LaneZone::new(
            Polygon::from_pairs(&[(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)]),
            Direction::new("North"),
        )
        .with_sweet_spot(Polygon::from_pairs(&[(40.0, 40.0), (60.0, 40.0), (60.0, 60.0), (40.0, 60.0)]))]);

        let speed = SpeedConfig {
            min_samples: 2,
            history_capacity: 4,
            ..SpeedConfig::default()
        };

        FrameProcessor::new(ProcessorParts {
            classifier,
            registry: Arc::new(TrackRegistry::new(speed, Homography::identity())),
            gate: CaptureGate::new(),
            event_log: EventLog::open(dir.path().join("log.csv")).unwrap(),
            delivery: sink,
            config,
        })
    }

    fn frame(t: f64, detections: Vec<TrackedDetection>) -> FrameInput {
        FrameInput::new(t, detections).with_image(RgbImage::new(200, 200))
    }

    fn det(track: u64, x: f64, y: f64, confidence: f64) -> TrackedDetection {
        TrackedDetection::new(track, BoundingBox::new(x - 5.0, y - 10.0, x + 5.0, y), "car", confidence)
    }

    #[test]
    fn test_low_confidence_is_skipped() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let mut p = processor(&dir, sink.clone());

        let report = p.process_frame(&frame(0.0, vec![det(1, 50.0, 50.0, 0.5), det(2, 50.0, 50.0, 0.3)]));
        assert_eq!(report.skipped, 2);
        assert_eq!(report.events, 0);
        assert!(sink.jobs.lock().unwrap().is_empty());
    }

    #[test]
    fn test_sweet_spot_frames_capture_once_and_count_once() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let mut p = processor(&dir, sink.clone());

        let captures: usize = (0..5)
            .map(|i| p.process_frame(&frame(i as f64 * 0.1, vec![det(1, 50.0, 50.0, 0.9)])).captures)
            .sum();

        assert_eq!(captures, 1);
        assert_eq!(sink.jobs.lock().unwrap().len(), 1);
        assert_eq!(p.registry().lane_total(0), 1);
    }

    #[test]
    fn test_missing_image_retries_capture_later() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let mut p = processor(&dir, sink.clone());

        let no_image = FrameInput::new(0.0, vec![det(1, 500.0, 500.0, 0.9)]);
        let report = p.process_frame(&no_image);
        assert_eq!(report.violations, 1);
        assert_eq!(report.captures, 0);
        assert!(!p.registry().is_captured(TrackId(1)));

        let report = p.process_frame(&frame(0.1, vec![det(1, 150.0, 150.0, 0.9)]));
        assert_eq!(report.captures, 1);
        let jobs = sink.jobs.lock().unwrap();
        assert!(jobs[0].event.violation);
        assert_eq!(jobs[0].event.speed, SpeedReading::Unknown);
    }

    #[test]
    fn test_every_detection_is_logged() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let mut p = processor(&dir, sink);

        p.process_frame(&frame(0.0, vec![det(1, 20.0, 20.0, 0.9), det(2, 150.0, 150.0, 0.9)]));
        p.process_frame(&frame(1.0, vec![det(1, 20.0, 30.0, 0.9)]));

        let log = std::fs::read_to_string(dir.path().join("log.csv")).unwrap();
        let rows: Vec<_> = log.lines().skip(1).collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].contains(",1,Lane 1,North,N/A,No"));
        assert!(rows[1].ends_with(",2,None,Unknown,N/A,Yes"));
        // Second sample for track 1 gives a speed.
        assert!(!rows[2].contains("N/A"));
    }

    #[test]
    fn test_idle_track_is_evicted_and_recaptured_as_new_vehicle() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let config = EngineConfig {
            idle_timeout: Some(Duration::from_secs(2)),
            ..EngineConfig::default()
        };
        let mut p = processor_with(&dir, sink.clone(), config);

        // Track 1 sits in the sweet spot once; track 2 is a violation seen every frame.
        p.process_frame(&frame(0.0, vec![det(1, 50.0, 50.0, 0.9), det(2, 150.0, 150.0, 0.9)]));
        assert_eq!(sink.jobs.lock().unwrap().len(), 2);
        assert_eq!(p.registry().lane_total(0), 1);

        for t in 1..=5 {
            let report = p.process_frame(&frame(t as f64, vec![det(2, 150.0, 150.0, 0.9)]));
            assert_eq!(report.captures, 0);
        }
        assert!(!p.registry().is_captured(TrackId(1)));
        assert!(p.registry().is_captured(TrackId(2)));
        assert_eq!(p.registry().track_count(), 1);

        let report = p.process_frame(&frame(6.0, vec![det(1, 50.0, 50.0, 0.9), det(2, 150.0, 150.0, 0.9)]));
        assert_eq!(report.captures, 1);
        assert_eq!(p.registry().lane_total(0), 2);

        let jobs = sink.jobs.lock().unwrap();
        let track_ids: Vec<u64> = jobs.iter().map(|job| job.event.track_id.as_u64()).collect();
        assert_eq!(track_ids.iter().filter(|&&id| id == 1).count(), 2);
        assert_eq!(track_ids.iter().filter(|&&id| id == 2).count(), 1);
    }

    #[test]
    fn test_no_eviction_without_idle_timeout() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let mut p = processor(&dir, sink.clone());

        p.process_frame(&frame(0.0, vec![det(1, 50.0, 50.0, 0.9)]));
        p.process_frame(&frame(1000.0, vec![det(2, 20.0, 20.0, 0.9)]));
        p.process_frame(&frame(1001.0, vec![det(1, 50.0, 50.0, 0.9)]));

        assert_eq!(p.registry().track_count(), 2);
        assert_eq!(sink.jobs.lock().unwrap().len(), 1);
        assert_eq!(p.registry().lane_total(0), 2);
    }
}
