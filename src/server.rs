//! HTTP surface.
//!
//! | Route | Method | Body |
//! |-------|--------|------|
//! | `/process/`, `/process` | POST | multipart: `content`, `custome_field_headers`*, `custome_field_items`* |
//! | `/health` | GET | none |
//!
//! The form field names (including the `custome_` spelling) are part of the
//! public contract and must not be changed.

use crate::error::IntakeError;
use crate::intake::{DocumentIntake, UploadedDocument};
use crate::output::IntakeResponse;
use crate::schema::CustomFields;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub const CONTENT_FIELD: &str = "content";
pub const HEADER_FIELDS_FIELD: &str = "custome_field_headers";
pub const ITEM_FIELDS_FIELD: &str = "custome_field_items";

/// Build the application router around a shared intake service.
pub fn router(intake: Arc<DocumentIntake>) -> Router {
    Router::new()
        .route("/process/", post(process_upload))
        .route("/process", post(process_upload))
        .route("/health", get(|| async { "ok" }))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(intake)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, intake: Arc<DocumentIntake>) -> Result<(), IntakeError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| IntakeError::Internal(format!("cannot bind {}: {}", addr, e)))?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, router(intake))
        .await
        .map_err(|e| IntakeError::Internal(format!("server error: {}", e)))
}

async fn process_upload(
    State(intake): State<Arc<DocumentIntake>>,
    multipart: Multipart,
) -> Result<Json<IntakeResponse>, IntakeError> {
    let (upload, fields) = read_form(multipart).await?;
    let response = intake.process(upload, fields).await?;
    Ok(Json(response))
}

/// Collect the upload and the repeated custom-field values.
async fn read_form(mut multipart: Multipart) -> Result<(UploadedDocument, CustomFields), IntakeError> {
    let mut upload: Option<UploadedDocument> = None;
    let mut headers: Vec<String> = Vec::new();
    let mut items: Vec<String> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| IntakeError::Multipart(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            CONTENT_FIELD => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| IntakeError::Multipart(e.body_text()))?;
                debug!("Received '{}' ({} bytes)", filename.as_deref().unwrap_or("<unnamed>"), bytes.len());
                upload = Some(UploadedDocument::new(bytes.to_vec(), filename, content_type));
            }
            HEADER_FIELDS_FIELD => headers.push(read_text(field).await?),
            ITEM_FIELDS_FIELD => items.push(read_text(field).await?),
            other => debug!("Ignoring form field '{}'", other),
        }
    }

    let upload = upload.ok_or_else(|| IntakeError::MissingField {
        field: CONTENT_FIELD.to_string(),
    })?;
    Ok((upload, CustomFields::from_form(headers, items)))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, IntakeError> {
    field
        .text()
        .await
        .map_err(|e| IntakeError::Multipart(e.body_text()))
}
