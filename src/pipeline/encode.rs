//! Image encoding: `DynamicImage` → standalone PNG/JPEG buffers, and raw
//! buffers → inline base64 parts for the generation request.
//!
//! PDF pages are encoded as PNG: lossless compression keeps rendered text
//! crisp. Detected crops come from photographs and are re-encoded as JPEG,
//! which is an order of magnitude smaller at no visible cost.

use crate::error::IntakeError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Encode a bitmap as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, IntakeError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(IntakeError::ImageEncode)?;
    debug!("Encoded {}x{} PNG → {} bytes", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Encode a bitmap as JPEG at `quality` (1–100). Alpha is dropped.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, IntakeError> {
    let mut buf = Vec::new();
    let rgb = img.to_rgb8();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&rgb)
        .map_err(IntakeError::ImageEncode)?;
    debug!("Encoded {}x{} JPEG → {} bytes", rgb.width(), rgb.height(), buf.len());
    Ok(buf)
}

/// MIME type of an encoded image, sniffed from its magic bytes.
///
/// Unknown formats are reported as `image/jpeg`.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Tiff) => "image/tiff",
        Ok(ImageFormat::Bmp) => "image/bmp",
        Ok(ImageFormat::Gif) => "image/gif",
        _ => "image/jpeg",
    }
}

/// An encoded image ready to be embedded in a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: &'static str,
    /// Base64 (standard alphabet, padded).
    pub data: String,
}

impl InlineImage {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            mime_type: sniff_mime(bytes),
            data: STANDARD.encode(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn png_round_trips_dimensions() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 7, Rgba([255, 0, 0, 255])));
        let png = encode_png(&img).expect("encode should succeed");
        assert_eq!(sniff_mime(&png), "image/png");
        let back = image::load_from_memory(&png).unwrap();
        assert_eq!((back.width(), back.height()), (10, 7));
    }

    #[test]
    fn jpeg_drops_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, Rgba([0, 0, 255, 128])));
        let jpeg = encode_jpeg(&img, 95).unwrap();
        assert_eq!(sniff_mime(&jpeg), "image/jpeg");
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn inline_image_is_base64() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])));
        let png = encode_png(&img).unwrap();
        let inline = InlineImage::from_bytes(&png);
        assert_eq!(inline.mime_type, "image/png");
        assert_eq!(STANDARD.decode(&inline.data).unwrap(), png);
    }
}
