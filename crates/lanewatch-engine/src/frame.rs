//! Frame input from the upstream tracker, as JSON Lines.
//!
//! One frame per line:
//!
//! ```json
//! {"timestamp": 12.04, "image": "frames/000301.jpg",
//!  "detections": [{"track_id": 7, "bbox": [617, 250, 700, 300], "class_name": "car", "confidence": 0.91}]}
//! ```

use std::io::BufRead;
use std::path::{Path, PathBuf};

use image::RgbImage;
use lanewatch_models::TrackedDetection;
use serde::Deserialize;
use tracing::{error, warn};

use crate::error::{EngineError, EngineResult};

/// One frame's worth of tracked detections.
#[derive(Debug, Clone, Default)]
pub struct FrameInput {
    /// Frame time in seconds
    pub timestamp: f64,
    /// Decoded frame, when available; needed for snapshots
    pub image: Option<RgbImage>,
    pub detections: Vec<TrackedDetection>,
}

impl FrameInput {
    pub fn new(timestamp: f64, detections: Vec<TrackedDetection>) -> Self {
        Self {
            timestamp,
            image: None,
            detections,
        }
    }

    pub fn with_image(mut self, image: RgbImage) -> Self {
        self.image = Some(image);
        self
    }
}

#[derive(Debug, Deserialize)]
struct FrameRecord {
    timestamp: f64,
    #[serde(default)]
    image: Option<PathBuf>,
    #[serde(default)]
    detections: Vec<TrackedDetection>,
}

/// Parse one JSON line.
fn parse_record(line: &str) -> EngineResult<FrameRecord> {
    let record: FrameRecord = serde_json::from_str(line)?;
    if !record.timestamp.is_finite() {
        return Err(EngineError::frame_input("timestamp is not finite"));
    }
    Ok(record)
}

/// Load a frame image as RGB.
pub fn load_image(path: &Path) -> EngineResult<RgbImage> {
    Ok(image::open(path)?.to_rgb8())
}

/// Iterator over frames in a JSON Lines stream.
///
/// Malformed lines are logged and skipped; a read error ends the stream.
/// Relative image paths resolve against `base_dir` when one is set.
pub struct FrameReader<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
    base_dir: Option<PathBuf>,
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            base_dir: None,
        }
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    fn resolve(&self, path: PathBuf) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        }
    }
}

impl<R: BufRead> Iterator for FrameReader<R> {
    type Item = FrameInput;

    fn next(&mut self) -> Option<FrameInput> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    error!(line = self.line_no + 1, "Failed to read frame input: {}", e);
                    return None;
                }
            };
            self.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }

            let record = match parse_record(&line) {
                Ok(record) => record,
                Err(e) => {
                    warn!(line = self.line_no, "Skipping malformed frame: {}", e);
                    continue;
                }
            };

            let image = record.image.map(|p| self.resolve(p)).and_then(|path| {
                load_image(&path)
                    .map_err(|e| warn!(line = self.line_no, "Frame image {} unavailable: {}", path.display(), e))
                    .ok()
            });

            return Some(FrameInput {
                timestamp: record.timestamp,
                image,
                detections: record.detections,
            });
        }
    }
}
