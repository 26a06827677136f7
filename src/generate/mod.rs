//! Generative-model seam: one multimodal request in, a stream of text
//! fragments out.
//!
//! Two backends implement [`GenerativeModel`]:
//!
//! - [`vertex::VertexGeminiModel`]: Vertex AI `streamGenerateContent` over SSE,
//!   authenticated with a service-account key. This is the production path.
//! - [`llm::LlmProviderModel`]: any `edgequake-llm` vision provider. The reply
//!   arrives in one piece and is surfaced as a single chunk.
//!
//! Tests substitute scripted implementations.

pub mod llm;
pub mod sse;
pub mod vertex;

use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::pipeline::encode::InlineImage;
use async_trait::async_trait;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// Content-safety categories sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmCategory {
    DangerousContent,
    Harassment,
    HateSpeech,
    SexuallyExplicit,
}

impl HarmCategory {
    pub const ALL: [HarmCategory; 4] = [
        HarmCategory::DangerousContent,
        HarmCategory::Harassment,
        HarmCategory::HateSpeech,
        HarmCategory::SexuallyExplicit,
    ];

    pub fn as_api_str(self) -> &'static str {
        match self {
            HarmCategory::DangerousContent => "HARM_CATEGORY_DANGEROUS_CONTENT",
            HarmCategory::Harassment => "HARM_CATEGORY_HARASSMENT",
            HarmCategory::HateSpeech => "HARM_CATEGORY_HATE_SPEECH",
            HarmCategory::SexuallyExplicit => "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        }
    }
}

/// Blocking threshold for a [`HarmCategory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmBlockThreshold {
    BlockNone,
}

impl HarmBlockThreshold {
    pub fn as_api_str(self) -> &'static str {
        match self {
            HarmBlockThreshold::BlockNone => "BLOCK_NONE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

impl SafetySetting {
    /// Every category with blocking disabled.
    pub fn block_none_all() -> Vec<SafetySetting> {
        HarmCategory::ALL
            .into_iter()
            .map(|category| SafetySetting {
                category,
                threshold: HarmBlockThreshold::BlockNone,
            })
            .collect()
    }
}

/// Sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl GenerationSettings {
    pub fn from_config(config: &IntakeConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from_config(&IntakeConfig::default())
    }
}

/// One multimodal request: images first, then the instruction text.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub images: Vec<InlineImage>,
    pub prompt: String,
    pub settings: GenerationSettings,
    pub safety: Vec<SafetySetting>,
}

impl GenerationRequest {
    pub fn new(images: Vec<InlineImage>, prompt: impl Into<String>, settings: GenerationSettings) -> Self {
        Self {
            images,
            prompt: prompt.into(),
            settings,
            safety: SafetySetting::block_none_all(),
        }
    }
}

/// One streamed fragment of a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseChunk {
    pub text: String,
    /// Usage metadata as `name: value` lines, when the chunk carries any.
    pub usage_metadata: Option<String>,
}

impl ResponseChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage_metadata: None,
        }
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage_metadata = Some(usage.into());
        self
    }
}

/// A boxed stream of reply fragments, in arrival order.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<ResponseChunk, IntakeError>> + Send>>;

/// A multimodal text generator.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Start a generation and return its fragment stream.
    async fn generate_stream(&self, request: GenerationRequest) -> Result<ResponseStream, IntakeError>;
}

/// Construct the configured backend.
///
/// With `llm_provider` set, the named `edgequake-llm` provider is used and
/// Vertex credentials are not needed. Otherwise Vertex AI Gemini is used.
pub fn build_model(config: &IntakeConfig) -> Result<Arc<dyn GenerativeModel>, IntakeError> {
    let model = config
        .model
        .as_deref()
        .ok_or(IntakeError::MissingEnv("GEMINI_MODEL"))?;

    if let Some(provider) = config.llm_provider.as_deref() {
        info!("Using edgequake-llm provider '{}' with model '{}'", provider, model);
        return Ok(Arc::new(llm::LlmProviderModel::from_name(provider, model)?));
    }

    let project = config
        .project_id
        .as_deref()
        .ok_or(IntakeError::MissingEnv("PROJECT_ID"))?;
    let credentials = config
        .credentials_file_path
        .as_deref()
        .ok_or(IntakeError::MissingEnv("CREDENTIALS_FILE_PATH"))?;

    info!("Using Vertex AI model '{}' in {}", model, config.location);
    Ok(Arc::new(vertex::VertexGeminiModel::new(
        project,
        &config.location,
        model,
        credentials,
    )?))
}
