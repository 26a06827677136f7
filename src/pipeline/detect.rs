//! Region detection: split an upload into one crop per receipt-like region.
//!
//! Each page bitmap goes through the box detector at the configured
//! confidence threshold; every accepted box is cropped and re-encoded as a
//! standalone JPEG. A bitmap with no accepted box is passed through whole,
//! so no page is ever dropped. This means blank or unrelated uploads still
//! cost one extraction call each.

use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::pipeline::encode;
use crate::pipeline::render;
use crate::pipeline::yolo::BoundingBox;
use image::DynamicImage;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Anything that can find document boxes in a bitmap.
///
/// Implemented by [`crate::pipeline::yolo::YoloDetector`]; tests plug in
/// fixed-answer doubles.
pub trait BoxDetector: Send + Sync {
    /// Boxes with score ≥ `conf_threshold`, in the detector's native order.
    fn detect_boxes(
        &self,
        image: &DynamicImage,
        conf_threshold: f32,
    ) -> Result<Vec<BoundingBox>, IntakeError>;
}

/// Crops receipt-like regions out of uploaded images and PDFs.
#[derive(Clone)]
pub struct RegionDetector {
    detector: Arc<dyn BoxDetector>,
    config: IntakeConfig,
}

impl RegionDetector {
    pub fn new(detector: Arc<dyn BoxDetector>, config: IntakeConfig) -> Self {
        Self { detector, config }
    }

    /// Detect regions in `file_bytes` and return one JPEG per region.
    ///
    /// PDFs (by magic number) are rasterised page by page; anything else is
    /// decoded as a single image. The result is never empty for a decodable
    /// input.
    pub async fn detect(&self, file_bytes: Vec<u8>) -> Result<Vec<Vec<u8>>, IntakeError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.detect_blocking(&file_bytes))
            .await
            .map_err(|e| IntakeError::Internal(format!("Detection task panicked: {}", e)))?
    }

    /// Blocking implementation of [`RegionDetector::detect`].
    pub fn detect_blocking(&self, file_bytes: &[u8]) -> Result<Vec<Vec<u8>>, IntakeError> {
        let bitmaps = self.load_bitmaps(file_bytes)?;
        let mut crops = Vec::new();
        for (idx, bitmap) in bitmaps.iter().enumerate() {
            let regions = self.crop_regions(bitmap)?;
            debug!("Bitmap {}: {} region(s)", idx + 1, regions.len());
            crops.extend(regions);
        }
        info!("Detected {} region(s) across {} bitmap(s)", crops.len(), bitmaps.len());
        Ok(crops)
    }

    fn load_bitmaps(&self, file_bytes: &[u8]) -> Result<Vec<DynamicImage>, IntakeError> {
        if render::is_pdf(file_bytes) {
            render::rasterise_all_blocking(file_bytes, &self.config)
        } else {
            let image = image::load_from_memory(file_bytes).map_err(IntakeError::ImageDecode)?;
            Ok(vec![image])
        }
    }

    /// Crops for one bitmap, or the whole bitmap when nothing usable is found.
    fn crop_regions(&self, bitmap: &DynamicImage) -> Result<Vec<Vec<u8>>, IntakeError> {
        let quality = self.config.jpeg_quality;
        let boxes = self
            .detector
            .detect_boxes(bitmap, self.config.confidence_threshold)?;

        let mut crops = Vec::with_capacity(boxes.len());
        for bbox in &boxes {
            match clamp_box(bbox, bitmap.width(), bitmap.height()) {
                Some((x, y, w, h)) => {
                    crops.push(encode::encode_jpeg(&bitmap.crop_imm(x, y, w, h), quality)?)
                }
                None => warn!("Skipping degenerate box {:?}", bbox),
            }
        }

        if crops.is_empty() {
            debug!("No usable detections; passing the whole bitmap through");
            crops.push(encode::encode_jpeg(bitmap, quality)?);
        }
        Ok(crops)
    }
}

/// Truncate a box to integer pixels inside a `width × height` bitmap.
///
/// Returns `(x, y, w, h)`, or `None` when nothing of the box remains.
pub fn clamp_box(bbox: &BoundingBox, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let clamp = |v: f32, max: u32| (v.max(0.0) as u32).min(max);
    let (x1, y1) = (clamp(bbox.x1, width), clamp(bbox.y1, height));
    let (x2, y2) = (clamp(bbox.x2, width), clamp(bbox.y2, height));
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some((x1, y1, x2 - x1, y2 - y1))
}
