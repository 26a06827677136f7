//! Shared test doubles: a fixed-answer box detector and a scripted model.

#![allow(dead_code)]

use async_trait::async_trait;
use edgequake_intake::pipeline::yolo::BoundingBox;
use edgequake_intake::{
    BoxDetector, DocumentIntake, GenerationRequest, GenerativeModel, IntakeConfig, IntakeError,
    ResponseChunk, ResponseStream,
};
use futures::stream;
use image::{DynamicImage, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

pub const USAGE_BLOCK: &str =
    "prompt_token_count: 1290\ncandidates_token_count: 412\ntotal_token_count: 1702\n";

pub const RECEIPT_REPLY: &str = r#"```json
{
  "document_type": "receipt",
  "supplier_name": "Corner Cafe",
  "total_amount": "12.50",
  "tax_amount": null,
  "line_item": [{"description": "Flat white", "quantity": "1", "total_price": "4.50"}]
}
```"#;

/// Returns the same boxes for every bitmap, filtered by the threshold.
pub struct FixedBoxes(pub Vec<BoundingBox>);

impl BoxDetector for FixedBoxes {
    fn detect_boxes(&self, _: &DynamicImage, conf: f32) -> Result<Vec<BoundingBox>, IntakeError> {
        Ok(self.0.iter().copied().filter(|b| b.score >= conf).collect())
    }
}

pub fn bbox(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> BoundingBox {
    BoundingBox {
        x1,
        y1,
        x2,
        y2,
        score,
        class_id: 0,
    }
}

/// Streams `reply` in a few fragments, usage on the last one, for every call.
pub struct ScriptedModel {
    reply: String,
    usage: Option<String>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedModel {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            usage: Some(USAGE_BLOCK.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<ResponseStream, IntakeError> {
        self.requests.lock().unwrap().push(request);

        let chars: Vec<char> = self.reply.chars().collect();
        let mut chunks: Vec<Result<ResponseChunk, IntakeError>> = chars
            .chunks(16)
            .map(|c| Ok(ResponseChunk::text(c.iter().collect::<String>())))
            .collect();
        if let Some(usage) = &self.usage {
            chunks.push(Ok(ResponseChunk::text("").with_usage(usage.clone())));
        }
        Ok(Box::pin(stream::iter(chunks)))
    }
}

pub fn intake(boxes: Vec<BoundingBox>, model: Arc<ScriptedModel>) -> DocumentIntake {
    DocumentIntake::new(IntakeConfig::default(), Arc::new(FixedBoxes(boxes)), model)
}

/// A plain JPEG "photo" of the given size.
pub fn photo_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([235, 230, 220])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .unwrap();
    buf
}

/// A minimal PDF with `pages` blank US-letter pages and a valid xref table.
pub fn blank_pdf(pages: usize) -> Vec<u8> {
    let mut objects: Vec<String> = Vec::new();
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", i + 3)).collect();
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        pages
    ));
    for _ in 0..pages {
        objects.push("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>".to_string());
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref_at = out.len();
    out.extend(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for off in offsets {
        out.extend(format!("{:010} 00000 n \n", off).as_bytes());
    }
    out.extend(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        )
        .as_bytes(),
    );
    out
}
