//! Evidentiary image snapshots.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageFormat, RgbImage};

use crate::error::{DeliveryError, DeliveryResult};

/// JPEG quality used for snapshots.
pub const JPEG_QUALITY: u8 = 90;

/// A vehicle crop, either still raw (copied off the frame buffer) or already
/// JPEG-encoded.
///
/// Raw crops are encoded by the delivery worker so the frame loop never pays
/// for the image codec.
#[derive(Debug, Clone)]
pub enum Snapshot {
    Raw(RgbImage),
    Jpeg(Vec<u8>),
}

impl Snapshot {
    /// Wrap a raw crop. Empty images are rejected.
    pub fn from_image(image: RgbImage) -> DeliveryResult<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DeliveryError::snapshot("crop is empty"));
        }
        Ok(Self::Raw(image))
    }

    /// Wrap already-encoded JPEG bytes.
    pub fn from_jpeg(bytes: Vec<u8>) -> DeliveryResult<Self> {
        if bytes.is_empty() {
            return Err(DeliveryError::snapshot("JPEG data is empty"));
        }
        Ok(Self::Jpeg(bytes))
    }

    /// Encode (or return) the JPEG bytes.
    pub fn to_jpeg(&self) -> DeliveryResult<Vec<u8>> {
        match self {
            Snapshot::Jpeg(bytes) => Ok(bytes.clone()),
            Snapshot::Raw(image) => {
                let mut buf = Vec::new();
                JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
                    .encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)
                    .map_err(|e| DeliveryError::snapshot(format!("JPEG encoding failed: {e}")))?;
                Ok(buf)
            }
        }
    }

    /// Decode the snapshot into pixels.
    pub fn decode(&self) -> DeliveryResult<RgbImage> {
        match self {
            Snapshot::Raw(image) => Ok(image.clone()),
            Snapshot::Jpeg(bytes) => image::load(Cursor::new(bytes), ImageFormat::Jpeg)
                .map(|img| img.to_rgb8())
                .map_err(|e| DeliveryError::snapshot(format!("JPEG decoding failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_crop_is_rejected() {
        assert!(Snapshot::from_image(RgbImage::new(0, 10)).is_err());
        assert!(Snapshot::from_jpeg(Vec::new()).is_err());
    }

    #[test]
    fn test_raw_snapshot_encodes_to_jpeg() {
        let snapshot = Snapshot::from_image(RgbImage::from_pixel(16, 8, image::Rgb([200, 10, 10]))).unwrap();
        let jpeg = snapshot.to_jpeg().unwrap();

        // JPEG SOI marker
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = Snapshot::from_jpeg(jpeg).unwrap().decode().unwrap();
        assert_eq!(decoded.dimensions(), (16, 8));
    }
}
