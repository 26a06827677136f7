//! Classification + extraction: one model call over a set of images.
//!
//! ```text
//! images ──▶ InlineImage ──▶ prompt(schemas) ──▶ stream ──▶ text + usage ──▶ parse
//! ```
//!
//! The stream is drained to completion before anything is parsed. A reply
//! that holds no recoverable JSON is returned verbatim as
//! [`ExtractionResult::Raw`]; a malformed usage block is fatal.

use crate::error::IntakeError;
use crate::generate::{GenerationRequest, GenerationSettings, GenerativeModel};
use crate::output::ExtractionResult;
use crate::pipeline::encode::InlineImage;
use crate::pipeline::parse::parse_structured;
use crate::pipeline::usage::parse_usage_text;
use crate::prompts::build_extraction_prompt;
use crate::schema::{CustomFields, ExtractionSchema};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives one generation per call to [`ExtractionPipeline::extract`].
#[derive(Clone)]
pub struct ExtractionPipeline {
    model: Arc<dyn GenerativeModel>,
    settings: GenerationSettings,
}

impl ExtractionPipeline {
    pub fn new(model: Arc<dyn GenerativeModel>, settings: GenerationSettings) -> Self {
        Self { model, settings }
    }

    /// Classify the document shown in `images` and extract its fields.
    ///
    /// All images go into a single request, in order, followed by the
    /// instruction text.
    pub async fn extract(
        &self,
        images: &[Vec<u8>],
        fields: &CustomFields,
    ) -> Result<ExtractionResult, IntakeError> {
        let start = Instant::now();
        let schemas = ExtractionSchema::all_extended(fields);
        let prompt = build_extraction_prompt(&schemas);
        let inline: Vec<InlineImage> = images.iter().map(|b| InlineImage::from_bytes(b)).collect();

        info!(
            "Extracting from {} image(s) with {} ({} custom header, {} custom item field(s))",
            inline.len(),
            self.model.name(),
            fields.headers.len(),
            fields.items.len()
        );

        let request = GenerationRequest::new(inline, prompt, self.settings);
        let mut stream = self.model.generate_stream(request).await?;

        let mut text = String::new();
        let mut usage_block: Option<String> = None;
        let mut chunks = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            text.push_str(&chunk.text);
            if chunk.usage_metadata.is_some() {
                usage_block = chunk.usage_metadata;
            }
            chunks += 1;
        }
        debug!("Reply: {} chunk(s), {} chars in {:?}", chunks, text.len(), start.elapsed());

        let usage = parse_usage_text(usage_block.as_deref().unwrap_or_default())?;

        match parse_structured(&text) {
            Some(parsed) => Ok(ExtractionResult::structured(parsed, &usage)),
            None => {
                warn!("Reply did not contain parseable JSON; returning raw text");
                Ok(ExtractionResult::Raw(text))
            }
        }
    }
}
