//! pdfium-backed integration tests.
//!
//! These need a pdfium shared library at runtime, so they are gated behind
//! the `E2E_ENABLED` environment variable. Point `PDFIUM_LIB_PATH` at the
//! directory holding libpdfium, or install it system-wide.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=. cargo test --test e2e -- --nocapture

mod common;

use common::{blank_pdf, FixedBoxes, ScriptedModel, RECEIPT_REPLY};
use edgequake_intake::{
    paginate, CustomFields, DocumentIntake, IntakeConfig, IntakeError, IntakeResponse,
    RegionDetector, UploadedDocument,
};
use std::sync::Arc;

/// Skip this test unless E2E_ENABLED is set.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

fn config() -> IntakeConfig {
    let mut builder = IntakeConfig::builder().max_rendered_pixels(400);
    if let Ok(dir) = std::env::var("PDFIUM_LIB_PATH") {
        builder = builder.pdfium_lib_path(dir);
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn sixteen_pages_paginate_in_order() {
    e2e_skip_unless_ready!();

    let pages = paginate(blank_pdf(16), &config()).await.unwrap();

    assert_eq!(pages.len(), 16);
    for (i, png) in pages.iter().enumerate() {
        let img = image::load_from_memory(png).unwrap_or_else(|e| panic!("page {}: {e}", i + 1));
        assert!(img.width() <= 400 && img.height() <= 400);
        assert!(img.height() > img.width(), "page {} should be portrait", i + 1);
    }
}

#[tokio::test]
async fn batch_boundary_does_not_change_output() {
    e2e_skip_unless_ready!();

    let pdf = blank_pdf(17);
    let batched = paginate(pdf.clone(), &config()).await.unwrap();
    let unbatched_config = IntakeConfig {
        pdf_batch_size: 100,
        ..config()
    };
    let unbatched = paginate(pdf, &unbatched_config).await.unwrap();

    assert_eq!(batched, unbatched);
}

#[tokio::test]
async fn corrupt_pdf_is_rejected() {
    e2e_skip_unless_ready!();

    let err = paginate(b"%PDF-1.4\nthis is not a pdf".to_vec(), &config())
        .await
        .unwrap_err();
    assert!(matches!(err, IntakeError::CorruptPdf { .. }), "got {err:?}");
}

#[tokio::test]
async fn pdf_upload_is_one_call_over_all_pages() {
    e2e_skip_unless_ready!();

    let model = ScriptedModel::new(RECEIPT_REPLY);
    let service = DocumentIntake::new(config(), Arc::new(FixedBoxes(Vec::new())), model.clone());
    let upload = UploadedDocument::new(blank_pdf(3), Some("statement.pdf".into()), None);

    let response = service.process(upload, CustomFields::default()).await.unwrap();

    let IntakeResponse::Single(result) = &response else {
        panic!("PDF upload must produce a single result, got {response:?}");
    };
    assert_eq!(result.document_type(), Some("receipt"));
    let requests = model.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].images.len(), 3);
    assert!(requests[0].images.iter().all(|i| i.mime_type == "image/png"));
}

#[tokio::test]
async fn detector_rasterises_pdf_bytes_per_page() {
    e2e_skip_unless_ready!();

    let detector = RegionDetector::new(Arc::new(FixedBoxes(Vec::new())), config());
    let crops = detector.detect(blank_pdf(2)).await.unwrap();

    assert_eq!(crops.len(), 2);
}
