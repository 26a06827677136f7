//! Configuration for the intake service.
//!
//! All behaviour is controlled through [`IntakeConfig`], built either from the
//! process environment ([`IntakeConfig::from_env`]) or via
//! [`IntakeConfigBuilder`]. The environment is read once at startup; there is
//! no hot-reload.
//!
//! | Variable | Required | Meaning |
//! |----------|----------|---------|
//! | `PROJECT_ID` | Vertex backend | Google Cloud project hosting the model |
//! | `CREDENTIALS_FILE_PATH` | Vertex backend | Service-account JSON key |
//! | `YOLO_MODEL_PATH` | yes | ONNX export of the receipt detector |
//! | `GEMINI_MODEL` | yes | Model identifier, e.g. `gemini-1.5-pro-002` |
//! | `VERTEX_LOCATION` | no | Vertex AI region (default `us-central1`) |
//! | `PDFIUM_LIB_PATH` | no | Directory containing libpdfium |
//! | `INTAKE_LLM_PROVIDER` | no | Use an edgequake-llm provider instead of Vertex |

use crate::error::IntakeError;
use std::path::PathBuf;

/// Default Vertex AI region.
pub const DEFAULT_LOCATION: &str = "us-central1";

/// Configuration for the intake pipeline.
///
/// # Example
/// ```rust
/// use edgequake_intake::IntakeConfig;
///
/// let config = IntakeConfig::builder()
///     .project_id("my-project")
///     .model("gemini-1.5-flash-002")
///     .confidence_threshold(0.6)
///     .build()
///     .unwrap();
/// assert_eq!(config.pdf_batch_size, 15);
/// ```
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Google Cloud project identifier (`PROJECT_ID`).
    pub project_id: Option<String>,

    /// Vertex AI region. Default: `us-central1`.
    pub location: String,

    /// Path to the service-account credentials JSON (`CREDENTIALS_FILE_PATH`).
    pub credentials_file_path: Option<PathBuf>,

    /// Generative model identifier (`GEMINI_MODEL`).
    pub model: Option<String>,

    /// edgequake-llm provider name. When set, generation goes through
    /// `ProviderFactory` instead of Vertex AI.
    pub llm_provider: Option<String>,

    /// ONNX detector model path (`YOLO_MODEL_PATH`).
    pub detector_model_path: Option<PathBuf>,

    /// Minimum detection confidence for a receipt box. Default: 0.8.
    pub confidence_threshold: f32,

    /// IoU above which overlapping detections are suppressed. Default: 0.7.
    pub iou_threshold: f32,

    /// Square input edge the detector was exported with. Default: 640.
    pub detector_input_size: u32,

    /// Pages rasterised per batch when paginating a PDF. Default: 15.
    ///
    /// Bounds peak memory on long documents; output is identical to
    /// rasterising everything at once.
    pub pdf_batch_size: usize,

    /// Maximum rendered page dimension in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// JPEG quality for detected crops. Default: 95.
    pub jpeg_quality: u8,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Nucleus sampling mass. Default: 1.0.
    pub top_p: f32,

    /// Top-k sampling cut-off. Default: 32.
    pub top_k: u32,

    /// Directory holding the pdfium shared library. `None` binds the system library.
    pub pdfium_lib_path: Option<PathBuf>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            location: DEFAULT_LOCATION.to_string(),
            credentials_file_path: None,
            model: None,
            llm_provider: None,
            detector_model_path: None,
            confidence_threshold: 0.8,
            iou_threshold: 0.7,
            detector_input_size: 640,
            pdf_batch_size: 15,
            max_rendered_pixels: 2000,
            jpeg_quality: 95,
            temperature: 0.0,
            top_p: 1.0,
            top_k: 32,
            pdfium_lib_path: None,
        }
    }
}

impl IntakeConfig {
    /// Create a new builder for `IntakeConfig`.
    pub fn builder() -> IntakeConfigBuilder {
        IntakeConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load the configuration from the process environment.
    pub fn from_env() -> Result<Self, IntakeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration through an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IntakeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut builder = Self::builder()
            .detector_model_path(get("YOLO_MODEL_PATH").ok_or(IntakeError::MissingEnv("YOLO_MODEL_PATH"))?)
            .model(get("GEMINI_MODEL").ok_or(IntakeError::MissingEnv("GEMINI_MODEL"))?);

        match get("INTAKE_LLM_PROVIDER") {
            Some(provider) => builder = builder.llm_provider(provider),
            None => {
                builder = builder
                    .project_id(get("PROJECT_ID").ok_or(IntakeError::MissingEnv("PROJECT_ID"))?)
                    .credentials_file_path(
                        get("CREDENTIALS_FILE_PATH")
                            .ok_or(IntakeError::MissingEnv("CREDENTIALS_FILE_PATH"))?,
                    );
            }
        }

        if let Some(location) = get("VERTEX_LOCATION") {
            builder = builder.location(location);
        }
        if let Some(path) = get("PDFIUM_LIB_PATH") {
            builder = builder.pdfium_lib_path(path);
        }

        builder.build()
    }
}

/// Builder for [`IntakeConfig`].
#[derive(Debug)]
pub struct IntakeConfigBuilder {
    config: IntakeConfig,
}

impl IntakeConfigBuilder {
    pub fn project_id(mut self, id: impl Into<String>) -> Self {
        self.config.project_id = Some(id.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.config.location = location.into();
        self
    }

    pub fn credentials_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.credentials_file_path = Some(path.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn llm_provider(mut self, name: impl Into<String>) -> Self {
        self.config.llm_provider = Some(name.into());
        self
    }

    pub fn detector_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.detector_model_path = Some(path.into());
        self
    }

    pub fn confidence_threshold(mut self, t: f32) -> Self {
        self.config.confidence_threshold = t.clamp(0.0, 1.0);
        self
    }

    pub fn iou_threshold(mut self, t: f32) -> Self {
        self.config.iou_threshold = t.clamp(0.0, 1.0);
        self
    }

    pub fn detector_input_size(mut self, px: u32) -> Self {
        self.config.detector_input_size = px;
        self
    }

    pub fn pdf_batch_size(mut self, n: usize) -> Self {
        self.config.pdf_batch_size = n;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.config.top_p = p.clamp(0.0, 1.0);
        self
    }

    pub fn top_k(mut self, k: u32) -> Self {
        self.config.top_k = k;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IntakeConfig, IntakeError> {
        let c = &self.config;
        if c.pdf_batch_size == 0 {
            return Err(IntakeError::InvalidConfig(
                "PDF batch size must be ≥ 1".into(),
            ));
        }
        if c.detector_input_size == 0 || c.detector_input_size % 32 != 0 {
            return Err(IntakeError::InvalidConfig(format!(
                "Detector input size must be a positive multiple of 32, got {}",
                c.detector_input_size
            )));
        }
        if c.top_k == 0 {
            return Err(IntakeError::InvalidConfig("top_k must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}
