//! # edgequake-intake
//!
//! Receipt and invoice intake: turn an uploaded photo or PDF into structured
//! JSON with a vision-language model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ PDF    rasterise every page via pdfium (15-page batches, spawn_blocking)
//!  │          └─ one extraction call over all pages
//!  │
//!  └─ image  YOLO region detection (tract-onnx), whole image if nothing found
//!             └─ one extraction call per detected region
//!
//! extraction: classify (receipt / invoice / other) + fill the matching
//!             template, streamed from Gemini, JSON recovered best-effort
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_intake::{CustomFields, DocumentIntake, IntakeConfig, UploadedDocument};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let intake = DocumentIntake::from_config(IntakeConfig::from_env()?)?;
//!     let bytes = std::fs::read("receipt.jpg")?;
//!     let upload = UploadedDocument::new(bytes, Some("receipt.jpg".into()), None);
//!     let fields = CustomFields::from_form(["store_phone"], Vec::<String>::new());
//!     let response = intake.process(upload, fields).await?;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `intake-server` binary (clap + anyhow + tracing-subscriber + dotenvy) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod generate;
pub mod intake;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod schema;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IntakeConfig, IntakeConfigBuilder};
pub use error::IntakeError;
pub use generate::{GenerationRequest, GenerativeModel, ResponseChunk, ResponseStream};
pub use intake::{DocumentIntake, UploadedDocument};
pub use output::{ExtractionResult, IntakeResponse};
pub use pipeline::detect::{BoxDetector, RegionDetector};
pub use pipeline::extract::ExtractionPipeline;
pub use pipeline::render::paginate;
pub use schema::{CustomFields, DocumentKind, ExtractionSchema};
pub use server::{router, serve};
