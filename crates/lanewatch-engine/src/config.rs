//! Engine and scene configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use lanewatch_analysis::{Homography, LaneClassifier, LaneZone, SpeedConfig};
use lanewatch_models::{Direction, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Default snapshot padding around the bounding box, in pixels.
pub const DEFAULT_SNAPSHOT_PADDING: u32 = 10;

/// Default detector confidence threshold.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

/// Runtime settings for the frame loop.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Scene file; `None` uses the built-in scene
    pub scene_path: Option<PathBuf>,
    /// CSV event log location
    pub event_log_path: PathBuf,
    /// Root of local fallback storage
    pub fallback_dir: PathBuf,
    /// Detections at or below this confidence are ignored
    pub min_confidence: f64,
    /// Pixels added around each side of a snapshot crop
    pub snapshot_padding: u32,
    /// Evict tracks unseen for this long; `None` keeps every track
    pub idle_timeout: Option<Duration>,
    /// Port for the Prometheus exporter; `None` disables it
    pub metrics_port: Option<u16>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scene_path: None,
            event_log_path: PathBuf::from("vehicle_log.csv"),
            fallback_dir: PathBuf::from("failed_uploads"),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            snapshot_padding: DEFAULT_SNAPSHOT_PADDING,
            idle_timeout: None,
            metrics_port: None,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            scene_path: std::env::var("SCENE_CONFIG_PATH").ok().map(PathBuf::from),
            event_log_path: std::env::var("EVENT_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("vehicle_log.csv")),
            fallback_dir: std::env::var("FALLBACK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("failed_uploads")),
            min_confidence: std::env::var("MIN_CONFIDENCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MIN_CONFIDENCE),
            snapshot_padding: std::env::var("SNAPSHOT_PADDING_PX")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SNAPSHOT_PADDING),
            idle_timeout: std::env::var("TRACK_IDLE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&secs: &f64| secs > 0.0 && secs.is_finite())
                .map(Duration::from_secs_f64),
            metrics_port: std::env::var("METRICS_PORT").ok().and_then(|s| s.parse().ok()),
        }
    }

    /// Load the configured scene, or the built-in one.
    pub fn load_scene(&self) -> EngineResult<SceneConfig> {
        match &self.scene_path {
            Some(path) => SceneConfig::load(path),
            None => Ok(SceneConfig::default()),
        }
    }
}

/// Image-to-ground calibration: four image corners and where they land on
/// the ground plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub source: [Point; 4],
    pub destination: [Point; 4],
}

/// Camera scene: lanes, calibration and speed settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    pub lanes: Vec<LaneZone>,
    pub calibration: Calibration,
    #[serde(default)]
    pub speed: SpeedConfig,
}

fn quad(pairs: [(f64, f64); 4]) -> [Point; 4] {
    pairs.map(|(x, y)| Point::new(x, y))
}

impl Default for SceneConfig {
    /// Two lanes toward the airport, calibrated on a 30 m stretch of road.
    fn default() -> Self {
        Self {
            lanes: vec![
                LaneZone::new(
                    Polygon::from_pairs(&[(617.0, 240.0), (858.0, 240.0), (1079.0, 360.0), (634.0, 360.0)]),
                    Direction::new("Airport"),
                )
                .with_sweet_spot(Polygon::from_pairs(&[
                    (650.0, 280.0),
                    (750.0, 280.0),
                    (750.0, 320.0),
                    (650.0, 320.0),
                ])),
                LaneZone::new(
                    Polygon::from_pairs(&[(300.0, 240.0), (562.0, 240.0), (563.0, 360.0), (15.0, 360.0)]),
                    Direction::new("Airport"),
                )
                .with_sweet_spot(Polygon::from_pairs(&[
                    (400.0, 280.0),
                    (500.0, 280.0),
                    (500.0, 320.0),
                    (400.0, 320.0),
                ])),
            ],
            calibration: Calibration {
                source: quad([(300.0, 240.0), (858.0, 240.0), (1079.0, 360.0), (15.0, 360.0)]),
                destination: quad([(0.0, 0.0), (500.0, 0.0), (500.0, 500.0), (0.0, 500.0)]),
            },
            speed: SpeedConfig::default(),
        }
    }
}

impl SceneConfig {
    /// Read and validate a JSON scene file.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::config(format!("cannot read scene {}: {}", path.display(), e)))?;
        let scene: SceneConfig = serde_json::from_str(&raw)
            .map_err(|e| EngineError::config(format!("invalid scene {}: {}", path.display(), e)))?;
        scene.validate()?;
        Ok(scene)
    }

    /// Validate the scene.
    pub fn validate(&self) -> EngineResult<()> {
        if self.lanes.is_empty() {
            return Err(EngineError::config("scene defines no lanes"));
        }

        for (i, lane) in self.lanes.iter().enumerate() {
            if lane.polygon.vertices.len() < 3 {
                return Err(EngineError::config(format!(
                    "lane {} polygon needs at least 3 vertices",
                    i + 1
                )));
            }
            if let Some(spot) = &lane.sweet_spot {
                if spot.vertices.len() < 3 {
                    return Err(EngineError::config(format!(
                        "lane {} sweet spot needs at least 3 vertices",
                        i + 1
                    )));
                }
            }
        }

        self.speed
            .validate()
            .map_err(|e| EngineError::config(e.to_string()))?;
        self.homography()?;
        Ok(())
    }

    pub fn classifier(&self) -> LaneClassifier {
        LaneClassifier::new(self.lanes.clone())
    }

    pub fn homography(&self) -> EngineResult<Homography> {
        Homography::from_quad(self.calibration.source, self.calibration.destination)
            .map_err(|e| EngineError::config(e.to_string()))
    }
}
