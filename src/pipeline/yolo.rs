//! YOLO receipt detector running an ONNX export through tract.
//!
//! The model is an ultralytics YOLO (v8 family) exported with
//! `yolo export format=onnx`, so it expects a fixed `[1, 3, S, S]` float input
//! and emits one `[1, 4 + C, N]` tensor: box centre, width and height in input
//! pixels followed by C per-class scores for each of N anchors. Ultralytics'
//! own predictor letterboxes the image going in and applies NMS coming out;
//! both steps are reproduced here so results line up with the training
//! tooling.

use crate::error::IntakeError;
use crate::pipeline::detect::BoxDetector;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::path::Path;
use tract_onnx::prelude::*;
use tracing::debug;

/// Grey used by ultralytics for letterbox padding.
const PAD_VALUE: f32 = 114.0 / 255.0;

type YoloPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// An axis-aligned detection in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    pub class_id: usize,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Scale and padding applied when letterboxing into the model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// Transform for fitting a `width × height` image into a `size × size` square.
    ///
    /// Pads are whole pixels: odd padding puts the extra pixel after the
    /// content, as ultralytics does with `round(pad - 0.1)`.
    pub fn fit(width: u32, height: u32, size: u32) -> Self {
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        let offset = |pad: f32| (pad / 2.0 - 0.1).round().max(0.0);
        Self {
            scale,
            pad_x: offset(size as f32 - new_w),
            pad_y: offset(size as f32 - new_h),
        }
    }

    /// Map a model-space coordinate back to the source image.
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Letterbox `image` into a `[1, 3, size, size]` RGB tensor scaled to `[0, 1]`.
pub fn preprocess(image: &DynamicImage, size: u32) -> (tract_ndarray::Array4<f32>, Letterbox) {
    let (w, h) = image.dimensions();
    let lb = Letterbox::fit(w, h, size);
    let new_w = ((w as f32 * lb.scale).round() as u32).clamp(1, size);
    let new_h = ((h as f32 * lb.scale).round() as u32).clamp(1, size);
    let resized = image.resize_exact(new_w, new_h, FilterType::Triangle).to_rgb8();

    let s = size as usize;
    let mut input = tract_ndarray::Array4::<f32>::from_elem((1, 3, s, s), PAD_VALUE);
    let (off_x, off_y) = (lb.pad_x as usize, lb.pad_y as usize);
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (px, py) = (x as usize + off_x, y as usize + off_y);
        if px >= s || py >= s {
            continue;
        }
        for c in 0..3 {
            input[[0, c, py, px]] = pixel[c] as f32 / 255.0;
        }
    }
    (input, lb)
}

/// Decode raw YOLO output into boxes above `conf_threshold`.
///
/// Accepts `[1, 4 + C, N]` (ultralytics default) and `[1, N, 4 + C]`; the
/// smaller of the two trailing axes is taken as the attribute axis.
pub fn decode_predictions(
    output: tract_ndarray::ArrayViewD<'_, f32>,
    letterbox: &Letterbox,
    conf_threshold: f32,
) -> Result<Vec<BoundingBox>, IntakeError> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 {
        return Err(IntakeError::InferenceFailed(format!(
            "Unexpected detector output shape: {:?}",
            shape
        )));
    }
    let attrs_first = shape[1] <= shape[2];
    let (num_attrs, num_anchors) = if attrs_first {
        (shape[1], shape[2])
    } else {
        (shape[2], shape[1])
    };
    if num_attrs < 5 {
        return Err(IntakeError::InferenceFailed(format!(
            "Detector output has {} attributes, expected at least 5",
            num_attrs
        )));
    }

    let at = |attr: usize, anchor: usize| -> f32 {
        if attrs_first {
            output[[0, attr, anchor]]
        } else {
            output[[0, anchor, attr]]
        }
    };

    let mut boxes = Vec::new();
    for anchor in 0..num_anchors {
        let (class_id, score) = (4..num_attrs)
            .map(|attr| (attr - 4, at(attr, anchor)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        if score < conf_threshold {
            continue;
        }
        let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
        let (x1, y1) = letterbox.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.unmap(cx + w / 2.0, cy + h / 2.0);
        boxes.push(BoundingBox {
            x1,
            y1,
            x2,
            y2,
            score,
            class_id,
        });
    }
    Ok(boxes)
}

/// Class-agnostic non-maximum suppression. Output is sorted by score, descending.
pub fn non_max_suppression(mut boxes: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    boxes.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<BoundingBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

/// Receipt detector backed by an ONNX YOLO model.
pub struct YoloDetector {
    plan: YoloPlan,
    input_size: u32,
    iou_threshold: f32,
}

impl std::fmt::Debug for YoloDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoloDetector")
            .field("input_size", &self.input_size)
            .field("iou_threshold", &self.iou_threshold)
            .finish()
    }
}

impl YoloDetector {
    /// Load and optimise the model at `path` for a `[1, 3, input_size, input_size]` input.
    pub fn load(path: &Path, input_size: u32, iou_threshold: f32) -> Result<Self, IntakeError> {
        debug!("Loading detector model from: {}", path.display());
        let load_err = |detail: String| IntakeError::ModelLoad {
            path: path.to_path_buf(),
            detail,
        };
        let size = input_size as usize;

        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| load_err(format!("Failed to load model: {}", e)))?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), &[1, 3, size, size][..]))
            .map_err(|e| load_err(format!("Failed to set input shape: {}", e)))?
            .into_optimized()
            .map_err(|e| load_err(format!("Failed to optimize: {}", e)))?
            .into_runnable()
            .map_err(|e| load_err(format!("Failed to build plan: {}", e)))?;

        Ok(Self {
            plan,
            input_size,
            iou_threshold,
        })
    }
}

impl BoxDetector for YoloDetector {
    fn detect_boxes(
        &self,
        image: &DynamicImage,
        conf_threshold: f32,
    ) -> Result<Vec<BoundingBox>, IntakeError> {
        let (input, letterbox) = preprocess(image, self.input_size);
        let tensor: Tensor = input.into();

        let outputs = self
            .plan
            .run(tvec!(tensor.into_tvalue()))
            .map_err(|e| IntakeError::InferenceFailed(e.to_string()))?;
        let output = outputs
            .first()
            .ok_or_else(|| IntakeError::InferenceFailed("No output from model".into()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| IntakeError::InferenceFailed(e.to_string()))?;
        debug!("Detector output shape: {:?}", view.shape());

        let boxes = decode_predictions(view, &letterbox, conf_threshold)?;
        let kept = non_max_suppression(boxes, self.iou_threshold);
        debug!("Detected {} regions at conf ≥ {}", kept.len(), conf_threshold);
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Write;

    fn bbox(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> BoundingBox {
        BoundingBox {
            x1,
            y1,
            x2,
            y2,
            score,
            class_id: 0,
        }
    }

    #[test]
    fn letterbox_landscape_pads_vertically() {
        let lb = Letterbox::fit(1280, 640, 640);
        assert_eq!(lb.scale, 0.5);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 160.0);
        assert_eq!(lb.unmap(320.0, 320.0), (640.0, 320.0));
    }

    #[test]
    fn preprocess_fills_padding_and_content() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 32, Rgb([255, 0, 0])));
        let (input, lb) = preprocess(&img, 64);
        assert_eq!(input.shape(), &[1, 3, 64, 64]);
        assert_eq!(lb.pad_y, 16.0);
        assert!((input[[0, 0, 0, 0]] - PAD_VALUE).abs() < 1e-6);
        assert!((input[[0, 0, 32, 32]] - 1.0).abs() < 1e-6);
        assert!(input[[0, 1, 32, 32]].abs() < 1e-6);
    }

    #[test]
    fn odd_padding_places_content_where_unmap_expects() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 61, Rgb([255, 0, 0])));
        let (input, lb) = preprocess(&img, 100);
        assert_eq!(lb.scale, 1.0);
        assert_eq!(lb.pad_y, 19.0);

        assert!((input[[0, 0, 18, 50]] - PAD_VALUE).abs() < 1e-6);
        assert!((input[[0, 0, 19, 50]] - 1.0).abs() < 1e-6);
        assert!((input[[0, 0, 79, 50]] - 1.0).abs() < 1e-6);
        assert!((input[[0, 0, 80, 50]] - PAD_VALUE).abs() < 1e-6);

        assert_eq!(lb.unmap(0.0, 19.0), (0.0, 0.0));
        assert_eq!(lb.unmap(99.0, 79.0), (99.0, 60.0));
    }

    /// Build a YOLO output tensor from per-anchor rows `[cx, cy, w, h, scores..]`.
    fn yolo_output(rows: &[Vec<f32>], anchors: usize, attrs_first: bool) -> tract_ndarray::ArrayD<f32> {
        let attrs = rows[0].len();
        let row = |a: usize| rows.get(a).cloned().unwrap_or_else(|| vec![0.0; attrs]);
        if attrs_first {
            let data = (0..attrs)
                .flat_map(|attr| (0..anchors).map(move |a| (attr, a)))
                .map(|(attr, a)| row(a)[attr])
                .collect();
            tract_ndarray::ArrayD::from_shape_vec(tract_ndarray::IxDyn(&[1, attrs, anchors]), data).unwrap()
        } else {
            let data = (0..anchors).flat_map(row).collect();
            tract_ndarray::ArrayD::from_shape_vec(tract_ndarray::IxDyn(&[1, anchors, attrs]), data).unwrap()
        }
    }

    #[test]
    fn decode_attribute_major_output() {
        // One class, eight anchors: [1, 5, 8].
        let rows = vec![
            vec![100.0, 100.0, 40.0, 20.0, 0.95],
            vec![300.0, 300.0, 20.0, 20.0, 0.30],
        ];
        let output = yolo_output(&rows, 8, true);
        let lb = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        let boxes = decode_predictions(output.view(), &lb, 0.8).unwrap();
        assert_eq!(boxes, vec![bbox(80.0, 90.0, 120.0, 110.0, 0.95)]);
    }

    #[test]
    fn decode_anchor_major_output() {
        // Two classes, nine anchors: [1, 9, 6].
        let rows = vec![
            vec![10.0, 10.0, 4.0, 4.0, 0.1, 0.9],
            vec![50.0, 50.0, 10.0, 10.0, 0.85, 0.2],
        ];
        let output = yolo_output(&rows, 9, false);
        let lb = Letterbox { scale: 0.5, pad_x: 0.0, pad_y: 0.0 };
        let boxes = decode_predictions(output.view(), &lb, 0.8).unwrap();
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].class_id, 1);
        assert_eq!((boxes[0].x1, boxes[0].y1, boxes[0].x2, boxes[0].y2), (16.0, 16.0, 24.0, 24.0));
        assert_eq!(boxes[1].class_id, 0);
    }

    #[test]
    fn decode_rejects_bad_shape() {
        let arr = tract_ndarray::ArrayD::<f32>::zeros(tract_ndarray::IxDyn(&[1, 3, 2]));
        let lb = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        assert!(decode_predictions(arr.view(), &lb, 0.5).is_err());
    }

    #[test]
    fn nms_suppresses_overlaps_and_sorts() {
        let boxes = vec![
            bbox(0.0, 0.0, 10.0, 10.0, 0.85),
            bbox(1.0, 1.0, 10.0, 10.0, 0.95),
            bbox(50.0, 50.0, 60.0, 60.0, 0.90),
        ];
        let kept = non_max_suppression(boxes, 0.7);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.95);
        assert_eq!(kept[1].score, 0.90);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = bbox(0.0, 0.0, 1.0, 1.0, 1.0);
        let b = bbox(2.0, 2.0, 3.0, 3.0, 1.0);
        assert_eq!(a.iou(&b), 0.0);
        assert_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn loading_garbage_model_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not an onnx model").unwrap();
        let err = YoloDetector::load(file.path(), 640, 0.7).unwrap_err();
        assert!(matches!(err, IntakeError::ModelLoad { .. }));
    }
}
