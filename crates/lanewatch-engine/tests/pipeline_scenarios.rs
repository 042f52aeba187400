//! End-to-end scenarios: frames in, event log and deliveries out.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use tempfile::TempDir;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lanewatch_analysis::{LaneZone, SpeedConfig};
use lanewatch_delivery::{
    DeliveryConfig, DeliveryOutcome, DeliveryPipeline, DeliveryReport, DeliveryStats, FallbackStore,
    IngestClient, IngestConfig,
};
use lanewatch_engine::{
    Calibration, CaptureGate, EngineConfig, EventLog, FrameInput, FrameProcessor, ProcessorParts,
    SceneConfig, TrackRegistry,
};
use lanewatch_models::{BoundingBox, Direction, Point, Polygon, TrackedDetection};

struct Harness {
    processor: FrameProcessor,
    pipeline: Arc<DeliveryPipeline>,
    reports: UnboundedReceiver<DeliveryReport>,
    dir: TempDir,
}

impl Harness {
    async fn new(server: &MockServer, scene: SceneConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig {
            event_log_path: dir.path().join("vehicle_log.csv"),
            fallback_dir: dir.path().join("failed_uploads"),
            ..EngineConfig::default()
        };

        let client = IngestClient::new(IngestConfig {
            endpoint: format!("{}/vehicle-detection", server.uri()),
            timeout: Duration::from_secs(1),
        })
        .unwrap();

        let (tx, reports) = mpsc::unbounded_channel();
        let pipeline = Arc::new(DeliveryPipeline::start_with_observer(
            DeliveryConfig::default(),
            Arc::new(client),
            FallbackStore::new(&config.fallback_dir),
            tx,
        ));

        let registry = Arc::new(TrackRegistry::new(scene.speed.clone(), scene.homography().unwrap()));
        let processor = FrameProcessor::new(ProcessorParts {
            classifier: scene.classifier(),
            registry,
            gate: CaptureGate::new(),
            event_log: EventLog::open(&config.event_log_path).unwrap(),
            delivery: pipeline.clone(),
            config,
        });

        Self {
            processor,
            pipeline,
            reports,
            dir,
        }
    }

    fn log_rows(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("vehicle_log.csv"))
            .unwrap()
            .lines()
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    async fn finish(self) -> (DeliveryStats, Vec<DeliveryReport>, TempDir) {
        let Harness {
            processor,
            pipeline,
            mut reports,
            dir,
        } = self;

        let stats = pipeline.shutdown().await;
        drop(processor);
        drop(pipeline);

        let mut collected = Vec::new();
        while let Some(report) = reports.recv().await {
            collected.push(report);
        }
        (stats, collected, dir)
    }
}

/// Box whose bottom-center is `(x, y)`.
fn det(track: u64, x: f64, y: f64) -> TrackedDetection {
    TrackedDetection::new(track, BoundingBox::new(x - 20.0, y - 40.0, x + 20.0, y), "car", 0.9)
}

fn frame(t: f64, detections: Vec<TrackedDetection>) -> FrameInput {
    FrameInput::new(t, detections).with_image(RgbImage::new(1080, 540))
}

async fn server_responding(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vehicle-detection"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn sweet_spot_across_five_frames_creates_one_job() {
    let server = server_responding(200).await;
    let mut h = Harness::new(&server, SceneConfig::default()).await;

    // (700, 300) is inside lane 1 and its sweet spot.
    for i in 0..5 {
        h.processor.process_frame(&frame(i as f64 * 0.04, vec![det(11, 700.0, 300.0)]));
    }

    let rows = h.log_rows();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r.contains(",11,Lane 1,Airport,")));

    let (stats, reports, _dir) = h.finish().await;
    assert_eq!(stats, DeliveryStats { delivered: 1, persisted: 0, lost: 0 });
    assert_eq!(reports.len(), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn violation_is_logged_every_frame_and_captured_once() {
    let server = server_responding(200).await;
    let mut h = Harness::new(&server, SceneConfig::default()).await;

    // Above both lanes.
    for i in 0..6 {
        let report = h.processor.process_frame(&frame(i as f64 * 0.04, vec![det(21, 500.0, 150.0)]));
        assert_eq!(report.violations, 1);
        assert_eq!(report.captures, usize::from(i == 0));
    }

    let rows = h.log_rows();
    assert_eq!(rows.len(), 6);
    assert!(rows.iter().all(|r| r.ends_with(",21,None,Unknown,N/A,Yes")));

    let (stats, reports, _dir) = h.finish().await;
    assert_eq!(stats.total(), 1);
    assert_eq!(reports[0].outcome, DeliveryOutcome::Delivered);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["detection_data"]["violation"], "Yes");
    assert_eq!(body["detection_data"]["lane"], "None");
    assert!(!body["snapshot"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn server_error_stores_event_and_snapshot_locally() {
    let server = server_responding(500).await;
    let mut h = Harness::new(&server, SceneConfig::default()).await;

    h.processor.process_frame(&frame(0.0, vec![det(31, 500.0, 150.0)]));

    let (stats, reports, dir) = h.finish().await;
    assert_eq!(stats, DeliveryStats { delivered: 0, persisted: 1, lost: 0 });
    assert!(matches!(reports[0].outcome, DeliveryOutcome::PersistedLocally(_)));

    let store = FallbackStore::new(dir.path().join("failed_uploads"));
    let records = store.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].stem.starts_with("vehicle_31_"));

    let (event, jpeg) = store.load(&records[0]).await.unwrap();
    assert_eq!(event.track_id.as_u64(), 31);
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
}

#[tokio::test]
async fn ground_plane_distance_gives_expected_speed() {
    let server = server_responding(200).await;

    let square = [
        Point::new(0.0, 0.0),
        Point::new(500.0, 0.0),
        Point::new(500.0, 500.0),
        Point::new(0.0, 500.0),
    ];
    let scene = SceneConfig {
        lanes: vec![LaneZone::new(
            Polygon::from_pairs(&[(-100.0, -100.0), (600.0, -100.0), (600.0, 600.0), (-100.0, 600.0)]),
            Direction::new("Airport"),
        )],
        calibration: Calibration {
            source: square,
            destination: square,
        },
        speed: SpeedConfig {
            min_samples: 2,
            ..SpeedConfig::default()
        },
    };
    let mut h = Harness::new(&server, scene).await;

    h.processor.process_frame(&frame(100.0, vec![det(41, 0.0, 0.0)]));
    h.processor.process_frame(&frame(101.0, vec![det(41, 0.0, 500.0)]));

    let rows = h.log_rows();
    assert!(rows[0].ends_with(",41,Lane 1,Airport,N/A,No"));
    assert!(rows[1].ends_with(",41,Lane 1,Airport,108.00,No"), "got {}", rows[1]);

    h.finish().await;
}

#[tokio::test]
async fn many_tracks_each_reach_exactly_one_outcome() {
    let server = server_responding(200).await;
    let mut h = Harness::new(&server, SceneConfig::default()).await;

    for i in 0..3 {
        let detections = (0..20).map(|t| det(100 + t, 50.0 + t as f64 * 40.0, 150.0)).collect();
        h.processor.process_frame(&frame(i as f64, detections));
    }

    let (stats, reports, _dir) = h.finish().await;
    assert_eq!(stats.total(), 20);

    let tracks: HashSet<_> = reports.iter().map(|r| r.track_id).collect();
    assert_eq!(tracks.len(), 20);
    assert_eq!(reports.len(), 20);
}

#[tokio::test]
async fn lane_counts_are_idempotent_per_track() {
    let server = server_responding(200).await;
    let mut h = Harness::new(&server, SceneConfig::default()).await;

    for i in 0..4 {
        h.processor.process_frame(&frame(
            i as f64,
            vec![det(1, 700.0, 340.0), det(2, 800.0, 340.0), det(3, 300.0, 340.0)],
        ));
    }

    let registry = Arc::clone(h.processor.registry());
    assert_eq!(registry.lane_total(0), 2);
    assert_eq!(registry.lane_total(1), 1);
    assert_eq!(registry.class_totals(0).get("car"), Some(&2));

    h.finish().await;
}
