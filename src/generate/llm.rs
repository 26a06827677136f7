//! `edgequake-llm` backend: any vision-capable provider behind the same
//! [`GenerativeModel`] seam.
//!
//! Providers answer in one piece, so the reply is surfaced as a single chunk
//! carrying both the text and the usage block.
//!
//! Temperature and top-p are forwarded. `CompletionOptions` has no top-k or
//! safety-setting fields, so those parts of the request are not sent.

use crate::error::IntakeError;
use crate::generate::{GenerationRequest, GenerativeModel, ResponseChunk, ResponseStream};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::stream;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub struct LlmProviderModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl LlmProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }

    /// Resolve `provider_name` through `ProviderFactory`; the provider reads
    /// its own API key from the environment.
    pub fn from_name(provider_name: &str, model: &str) -> Result<Self, IntakeError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            IntakeError::InvalidConfig(format!(
                "edgequake-llm provider '{}' is not usable: {}",
                provider_name, e
            ))
        })?;
        Ok(Self::new(provider, format!("{}/{}", provider_name, model)))
    }
}

#[async_trait]
impl GenerativeModel for LlmProviderModel {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<ResponseStream, IntakeError> {
        let start = Instant::now();
        let images: Vec<ImageData> = request
            .images
            .into_iter()
            .map(|image| ImageData::new(image.data, image.mime_type))
            .collect();
        let messages = vec![ChatMessage::user_with_images(request.prompt.as_str(), images)];
        let options = CompletionOptions {
            temperature: Some(request.settings.temperature),
            top_p: Some(request.settings.top_p),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| IntakeError::GenerationFailed(format!("{}", e)))?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.label,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        let chunk = ResponseChunk::text(response.content).with_usage(usage_text(
            response.prompt_tokens as u64,
            response.completion_tokens as u64,
        ));
        Ok(Box::pin(stream::iter(vec![Ok(chunk)])))
    }
}

/// Usage block in the same field names the Vertex backend reports.
pub fn usage_text(prompt_tokens: u64, completion_tokens: u64) -> String {
    format!(
        "prompt_token_count: {}\ncandidates_token_count: {}\ntotal_token_count: {}\n",
        prompt_tokens,
        completion_tokens,
        prompt_tokens + completion_tokens
    )
}
