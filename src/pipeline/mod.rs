//! Pipeline stages for document intake.
//!
//! ## Data Flow
//!
//! ```text
//! PDF   ──▶ render ──▶ encode(PNG) ─────────────────┐
//!                                                   ├──▶ extract ──▶ parse + usage
//! image ──▶ detect(yolo) ──▶ encode(JPEG crops) ────┘
//! ```
//!
//! 1. [`render`]  rasterise PDF pages in fixed-size batches; pdfium is not
//!    async-safe, so this runs in `spawn_blocking`
//! 2. [`detect`]  find receipt regions with [`yolo`] and crop them
//! 3. [`encode`]  PNG/JPEG encoding and base64 inline parts
//! 4. [`extract`] drive the single streamed model call
//! 5. [`parse`] / [`usage`] recover JSON and token counts from the reply

pub mod detect;
pub mod encode;
pub mod extract;
pub mod parse;
pub mod render;
pub mod usage;
pub mod yolo;
