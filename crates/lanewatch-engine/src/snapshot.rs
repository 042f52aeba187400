//! Cropping vehicle snapshots out of frames.

use image::RgbImage;
use lanewatch_delivery::Snapshot;
use lanewatch_models::BoundingBox;

use crate::error::{EngineError, EngineResult};

/// Copy the padded bounding box region out of `frame`.
///
/// The region is clamped to the frame. A box that ends up empty (fully
/// outside the frame, zero-sized, or non-finite) is an
/// [`EngineError::EmptyCrop`].
pub fn extract_snapshot(frame: &RgbImage, bbox: &BoundingBox, padding: u32) -> EngineResult<Snapshot> {
    if !bbox.is_finite() {
        return Err(EngineError::empty_crop("bounding box is not finite"));
    }

    let region = bbox.pad(padding as f64).clamp(frame.width(), frame.height());
    let x1 = region.x1.floor() as u32;
    let y1 = region.y1.floor() as u32;
    let x2 = region.x2.ceil() as u32;
    let y2 = region.y2.ceil() as u32;

    if x2 <= x1 || y2 <= y1 {
        return Err(EngineError::empty_crop(format!(
            "region {:?} lies outside the {}x{} frame",
            bbox.as_array(),
            frame.width(),
            frame.height()
        )));
    }

    let crop = image::imageops::crop_imm(frame, x1, y1, x2 - x1, y2 - y1).to_image();
    Snapshot::from_image(crop).map_err(|e| EngineError::empty_crop(e.to_string()))
}
