//! Vertex AI Gemini backend (`streamGenerateContent` with `alt=sse`).

use crate::error::IntakeError;
use crate::generate::sse::SseDecoder;
use crate::generate::{GenerationRequest, GenerativeModel, ResponseChunk, ResponseStream};
use crate::pipeline::usage::usage_text_from_json;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::path::Path;
use tracing::debug;

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Gemini on Vertex AI, authenticated with a service-account key file.
pub struct VertexGeminiModel {
    client: reqwest::Client,
    credentials: CustomServiceAccount,
    endpoint: String,
    model: String,
}

impl std::fmt::Debug for VertexGeminiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexGeminiModel")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl VertexGeminiModel {
    pub fn new(
        project_id: &str,
        location: &str,
        model: &str,
        credentials_path: &Path,
    ) -> Result<Self, IntakeError> {
        let credentials = CustomServiceAccount::from_file(credentials_path).map_err(|e| {
            IntakeError::Auth(format!(
                "cannot load service account '{}': {}",
                credentials_path.display(),
                e
            ))
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            credentials,
            endpoint: stream_endpoint(project_id, location, model),
            model: model.to_string(),
        })
    }
}

/// `streamGenerateContent` URL for a publisher model.
pub fn stream_endpoint(project_id: &str, location: &str, model: &str) -> String {
    format!(
        "https://{location}-aiplatform.googleapis.com/v1/projects/{project_id}/locations/{location}/publishers/google/models/{model}:streamGenerateContent?alt=sse"
    )
}

#[async_trait]
impl GenerativeModel for VertexGeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<ResponseStream, IntakeError> {
        let token = self
            .credentials
            .token(&[CLOUD_PLATFORM_SCOPE])
            .await
            .map_err(|e| IntakeError::Auth(e.to_string()))?;

        let body = RequestBody::from_request(&request);
        debug!(
            "POST {} ({} image part(s), prompt {} chars)",
            self.endpoint,
            request.images.len(),
            request.prompt.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| IntakeError::GenerationFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IntakeError::GenerationStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(sse_chunks(Box::pin(response.bytes_stream())))
    }
}

/// Turn a raw SSE byte stream into decoded reply chunks.
fn sse_chunks<S, B, E>(bytes: S) -> ResponseStream
where
    S: futures::Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let pending: VecDeque<Result<ResponseChunk, IntakeError>> = VecDeque::new();
    let state = (bytes, Some(SseDecoder::new()), pending);
    Box::pin(stream::unfold(state, |(mut bytes, mut decoder, mut pending)| async move {
        loop {
            if let Some(item) = pending.pop_front() {
                return Some((item, (bytes, decoder, pending)));
            }
            let active = decoder.as_mut()?;
            match bytes.next().await {
                Some(Ok(chunk)) => {
                    pending.extend(active.push(chunk.as_ref()).iter().map(|payload| decode_chunk(payload)));
                }
                Some(Err(e)) => {
                    pending.push_back(Err(IntakeError::GenerationFailed(e.to_string())));
                    decoder = None;
                }
                None => {
                    if let Some(payload) = decoder.take().and_then(SseDecoder::finish) {
                        pending.push_back(decode_chunk(&payload));
                    }
                }
            }
        }
    }))
}

/// Decode one SSE `data:` payload.
pub fn decode_chunk(payload: &str) -> Result<ResponseChunk, IntakeError> {
    let parsed: StreamResponse =
        serde_json::from_str(payload).map_err(|e| IntakeError::StreamDecode(e.to_string()))?;

    if let Some(error) = parsed.error {
        return Err(IntakeError::GenerationFailed(error.to_string()));
    }

    let text = parsed
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<String>()
        })
        .unwrap_or_default();

    Ok(ResponseChunk {
        text,
        usage_metadata: parsed.usage_metadata.as_ref().map(usage_text_from_json),
    })
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestBody<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySettingBody>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Serialize)]
struct SafetySettingBody {
    category: &'static str,
    threshold: &'static str,
}

impl<'a> RequestBody<'a> {
    fn from_request(request: &'a GenerationRequest) -> Self {
        let mut parts: Vec<Part<'a>> = request
            .images
            .iter()
            .map(|image| Part::Inline {
                inline_data: InlineData {
                    mime_type: image.mime_type,
                    data: &image.data,
                },
            })
            .collect();
        parts.push(Part::Text {
            text: &request.prompt,
        });

        Self {
            contents: vec![Content { role: "user", parts }],
            generation_config: GenerationConfig {
                temperature: request.settings.temperature,
                top_p: request.settings.top_p,
                top_k: request.settings.top_k,
            },
            safety_settings: request
                .safety
                .iter()
                .map(|s| SafetySettingBody {
                    category: s.category.as_api_str(),
                    threshold: s.threshold.as_api_str(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<Value>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}
