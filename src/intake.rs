//! Request handling: route an upload through pagination or detection and
//! then extraction.
//!
//! ```text
//! application/pdf ──▶ paginate ──▶ extract(all pages)      ──▶ Single
//! anything else   ──▶ detect   ──▶ extract(crop) per crop  ──▶ PerRegion
//! ```
//!
//! Per-crop extraction runs sequentially, in detection order.

use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::generate::{self, GenerationSettings, GenerativeModel};
use crate::output::IntakeResponse;
use crate::pipeline::detect::{BoxDetector, RegionDetector};
use crate::pipeline::extract::ExtractionPipeline;
use crate::pipeline::render;
use crate::pipeline::yolo::YoloDetector;
use crate::schema::CustomFields;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const PDF_MIME: &str = "application/pdf";

/// An uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
    /// MIME type the client declared for the part, if any.
    pub content_type: Option<String>,
}

impl UploadedDocument {
    pub fn new(bytes: Vec<u8>, filename: Option<String>, content_type: Option<String>) -> Self {
        Self {
            bytes,
            filename,
            content_type,
        }
    }

    /// MIME type used for routing.
    ///
    /// Guessed from the filename extension first, then the declared part
    /// type; a nameless, untyped upload starting with `%PDF` counts as PDF.
    pub fn mime(&self) -> String {
        if let Some(guess) = self
            .filename
            .as_deref()
            .and_then(|name| mime_guess::from_path(name).first())
        {
            return guess.essence_str().to_string();
        }
        if let Some(declared) = self.content_type.as_deref().filter(|t| !t.is_empty()) {
            return declared.to_ascii_lowercase();
        }
        if render::is_pdf(&self.bytes) {
            PDF_MIME.to_string()
        } else {
            "application/octet-stream".to_string()
        }
    }

    pub fn is_pdf(&self) -> bool {
        self.mime() == PDF_MIME
    }
}

/// The intake service: detector and generative model, built once and shared.
pub struct DocumentIntake {
    config: IntakeConfig,
    detector: RegionDetector,
    pipeline: ExtractionPipeline,
}

impl DocumentIntake {
    pub fn new(
        config: IntakeConfig,
        detector: Arc<dyn BoxDetector>,
        model: Arc<dyn GenerativeModel>,
    ) -> Self {
        let settings = GenerationSettings::from_config(&config);
        Self {
            detector: RegionDetector::new(detector, config.clone()),
            pipeline: ExtractionPipeline::new(model, settings),
            config,
        }
    }

    /// Load the ONNX detector and connect the configured generative backend.
    pub fn from_config(config: IntakeConfig) -> Result<Self, IntakeError> {
        let model_path = config
            .detector_model_path
            .as_deref()
            .ok_or(IntakeError::MissingEnv("YOLO_MODEL_PATH"))?;
        let detector = YoloDetector::load(model_path, config.detector_input_size, config.iou_threshold)?;
        info!("Detector loaded: {:?}", detector);
        let model = generate::build_model(&config)?;
        Ok(Self::new(config, Arc::new(detector), model))
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    /// Process one upload.
    pub async fn process(
        &self,
        upload: UploadedDocument,
        fields: CustomFields,
    ) -> Result<IntakeResponse, IntakeError> {
        let start = Instant::now();
        let mime = upload.mime();
        info!(
            "Processing {} ({}, {} bytes)",
            upload.filename.as_deref().unwrap_or("<unnamed>"),
            mime,
            upload.bytes.len()
        );

        let response = if mime == PDF_MIME {
            let pages = render::paginate(upload.bytes, &self.config).await?;
            info!("Paginated into {} page image(s)", pages.len());
            IntakeResponse::Single(self.pipeline.extract(&pages, &fields).await?)
        } else {
            let crops = self.detector.detect(upload.bytes).await?;
            let mut results = Vec::with_capacity(crops.len());
            for (i, crop) in crops.into_iter().enumerate() {
                debug!("Extracting region {}", i + 1);
                results.push(self.pipeline.extract(std::slice::from_ref(&crop), &fields).await?);
            }
            IntakeResponse::PerRegion(results)
        };

        info!(
            "Done: {} result(s) in {:?}",
            response.len(),
            start.elapsed()
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(filename: Option<&str>, content_type: Option<&str>, bytes: &[u8]) -> UploadedDocument {
        UploadedDocument::new(
            bytes.to_vec(),
            filename.map(str::to_string),
            content_type.map(str::to_string),
        )
    }

    #[test]
    fn mime_from_extension() {
        assert!(upload(Some("statement.PDF"), None, b"").is_pdf());
        assert_eq!(upload(Some("receipt.jpg"), None, b"").mime(), "image/jpeg");
        assert_eq!(upload(Some("scan.png"), Some("application/pdf"), b"").mime(), "image/png");
    }

    #[test]
    fn mime_falls_back_to_declared_type() {
        assert!(upload(Some("upload"), Some("application/pdf"), b"").is_pdf());
        assert_eq!(upload(None, Some("Image/JPEG"), b"").mime(), "image/jpeg");
    }

    #[test]
    fn untyped_pdf_is_sniffed() {
        assert!(upload(None, None, b"%PDF-1.4\n").is_pdf());
        assert!(!upload(None, None, b"\xFF\xD8\xFF").is_pdf());
    }

    #[test]
    fn from_config_requires_detector_model() {
        let err = DocumentIntake::from_config(IntakeConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, IntakeError::MissingEnv("YOLO_MODEL_PATH")));
    }
}
