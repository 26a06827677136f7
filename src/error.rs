//! Error type for the edgequake-intake library.
//!
//! Every failure in this service is fatal for the request that hit it: there
//! are no retries and no partial results. The one *expected* bad outcome,
//! a model reply that does not contain parseable JSON, is not an error at all;
//! it degrades to [`crate::output::ExtractionResult::Raw`].
//!
//! At the HTTP boundary an [`IntakeError`] becomes a `500` carrying
//! `{"detail": "<message>"}` (see the `IntoResponse` impl below).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-intake library.
#[derive(Debug, Error)]
pub enum IntakeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The multipart request did not carry the required `content` file.
    #[error("Missing required form field '{field}'")]
    MissingField { field: String },

    /// The multipart body could not be read.
    #[error("Malformed multipart body: {0}")]
    Multipart(String),

    /// The upload is not a PDF and the image decoder rejected it.
    #[error("Could not decode uploaded image: {0}")]
    ImageDecode(#[source] image::ImageError),

    /// Re-encoding a page or crop failed.
    #[error("Image encoding failed: {0}")]
    ImageEncode(#[source] image::ImageError),

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {detail}")]
    CorruptPdf { detail: String },

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH to the directory containing libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Detection errors ──────────────────────────────────────────────────
    /// The ONNX detection model could not be loaded.
    #[error("Failed to load detection model '{path}': {detail}")]
    ModelLoad { path: PathBuf, detail: String },

    /// Running the detection model failed.
    #[error("Detection inference failed: {0}")]
    InferenceFailed(String),

    // ── Generation errors ─────────────────────────────────────────────────
    /// Service-account credentials could not be loaded or exchanged for a token.
    #[error("Authentication with the generation service failed: {0}")]
    Auth(String),

    /// The generation service answered with a non-success status.
    #[error("Generation API returned HTTP {status}: {body}")]
    GenerationStatus { status: u16, body: String },

    /// Transport failure talking to the generation service.
    #[error("Generation request failed: {0}")]
    GenerationFailed(String),

    /// A streamed chunk could not be decoded.
    #[error("Malformed generation stream chunk: {0}")]
    StreamDecode(String),

    /// A usage-metadata line was not of the form `name: <integer>`.
    #[error("Malformed usage metadata line: {line:?}")]
    MalformedUsage { line: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// A required environment variable is not set.
    #[error("Environment variable {0} is not set")]
    MissingEnv(&'static str),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntakeError {
    /// HTTP status used when this error reaches the transport layer.
    pub fn status_code(&self) -> StatusCode {
        match self {
            IntakeError::MissingField { .. } | IntakeError::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(serde::Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_usage_display() {
        let e = IntakeError::MalformedUsage {
            line: "total_token_count: many".into(),
        };
        assert!(e.to_string().contains("total_token_count: many"));
    }

    #[test]
    fn generation_status_display() {
        let e = IntakeError::GenerationStatus {
            status: 403,
            body: "permission denied".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("403"), "got: {msg}");
        assert!(msg.contains("permission denied"), "got: {msg}");
    }

    #[test]
    fn missing_field_is_client_error() {
        let e = IntakeError::MissingField {
            field: "content".into(),
        };
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn processing_faults_are_server_errors() {
        let e = IntakeError::CorruptPdf {
            detail: "no xref".into(),
        };
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            IntakeError::MissingEnv("PROJECT_ID").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
