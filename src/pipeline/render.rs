//! PDF pagination: rasterise every page via pdfium, in fixed-size batches.
//!
//! ## Why batches?
//!
//! A long scanned PDF rasterised in one go holds every page bitmap in memory at
//! once. Rendering `pdf_batch_size` pages at a time (15 by default) and
//! encoding each batch before starting the next bounds that peak. Batching is
//! invisible in the output: one entry per page, in page order.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-bound and not
//! async-safe. All pdfium work runs on Tokio's blocking pool.

use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::pipeline::encode;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Leading bytes of every PDF file.
pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Whether `bytes` start with the PDF magic number.
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// Page-index ranges of each batch: `ceil(total / batch_size)` ranges covering
/// `0..total` in order.
pub fn batch_ranges(total_pages: usize, batch_size: usize) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    (0..total_pages.div_ceil(batch_size))
        .map(|i| {
            let start = i * batch_size;
            start..(start + batch_size).min(total_pages)
        })
        .collect()
}

/// Drive `render_batch` over every batch and concatenate the results.
///
/// `render_batch` receives 0-based page ranges and must return one item per
/// page in the range.
pub fn rasterise_in_batches<T, F>(
    total_pages: usize,
    batch_size: usize,
    mut render_batch: F,
) -> Result<Vec<T>, IntakeError>
where
    F: FnMut(Range<usize>) -> Result<Vec<T>, IntakeError>,
{
    let mut all = Vec::with_capacity(total_pages);
    for (i, range) in batch_ranges(total_pages, batch_size).into_iter().enumerate() {
        let (first, last) = (range.start + 1, range.end);
        let pages = render_batch(range)?;
        all.extend(pages);
        info!("Part {} processed with pages from {} to {}.", i + 1, first, last);
    }
    Ok(all)
}

/// Rasterise every page of `pdf_bytes` and PNG-encode it.
pub async fn paginate(pdf_bytes: Vec<u8>, config: &IntakeConfig) -> Result<Vec<Vec<u8>>, IntakeError> {
    let settings = RenderSettings::from_config(config);
    tokio::task::spawn_blocking(move || {
        with_document(&pdf_bytes, &settings, |document, render_config| {
            let total = document.pages().len() as usize;
            info!("PDF loaded: {} pages", total);
            rasterise_in_batches(total, settings.batch_size, |range| {
                render_range(document, render_config, range)?
                    .iter()
                    .map(encode::encode_png)
                    .collect()
            })
        })
    })
    .await
    .map_err(|e| IntakeError::Internal(format!("Pagination task panicked: {}", e)))?
}

/// Rasterise every page of `pdf_bytes` to bitmaps.
///
/// Blocking; call from a blocking context.
pub fn rasterise_all_blocking(
    pdf_bytes: &[u8],
    config: &IntakeConfig,
) -> Result<Vec<DynamicImage>, IntakeError> {
    let settings = RenderSettings::from_config(config);
    with_document(pdf_bytes, &settings, |document, render_config| {
        let total = document.pages().len() as usize;
        rasterise_in_batches(total, settings.batch_size, |range| {
            render_range(document, render_config, range)
        })
    })
}

#[derive(Debug, Clone)]
struct RenderSettings {
    max_pixels: u32,
    batch_size: usize,
    pdfium_lib_path: Option<PathBuf>,
}

impl RenderSettings {
    fn from_config(config: &IntakeConfig) -> Self {
        Self {
            max_pixels: config.max_rendered_pixels,
            batch_size: config.pdf_batch_size,
            pdfium_lib_path: config.pdfium_lib_path.clone(),
        }
    }
}

/// Bind pdfium, open the document and hand it to `f`.
fn with_document<R>(
    pdf_bytes: &[u8],
    settings: &RenderSettings,
    f: impl FnOnce(&PdfDocument<'_>, &PdfRenderConfig) -> Result<R, IntakeError>,
) -> Result<R, IntakeError> {
    let pdfium = bind_pdfium(settings.pdfium_lib_path.as_deref())?;
    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(|e| IntakeError::CorruptPdf {
            detail: format!("{:?}", e),
        })?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(settings.max_pixels as i32)
        .set_maximum_height(settings.max_pixels as i32);

    f(&document, &render_config)
}

/// Bind to pdfium in `lib_dir`, or to the system library when `None`.
fn bind_pdfium(lib_dir: Option<&Path>) -> Result<Pdfium, IntakeError> {
    let bindings = match lib_dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| IntakeError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Render the pages in `range` (0-based).
fn render_range(
    document: &PdfDocument<'_>,
    render_config: &PdfRenderConfig,
    range: Range<usize>,
) -> Result<Vec<DynamicImage>, IntakeError> {
    let pages = document.pages();
    let mut images = Vec::with_capacity(range.len());

    for idx in range {
        let page = pages
            .get(idx as u16)
            .map_err(|e| IntakeError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page.render_with_config(render_config).map_err(|e| {
            IntakeError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_magic_detection() {
        assert!(is_pdf(b"%PDF-1.7\n%\xe2\xe3"));
        assert!(!is_pdf(b"\x89PNG\r\n"));
        assert!(!is_pdf(b"%PD"));
        assert!(!is_pdf(b""));
    }

    #[test]
    fn batch_ranges_split_at_fifteen() {
        assert_eq!(batch_ranges(16, 15), vec![0..15, 15..16]);
        assert_eq!(batch_ranges(15, 15), vec![0..15]);
        assert_eq!(batch_ranges(31, 15), vec![0..15, 15..30, 30..31]);
        assert!(batch_ranges(0, 15).is_empty());
    }

    #[test]
    fn sixteen_pages_take_two_batches_in_order() {
        let mut calls = Vec::new();
        let pages = rasterise_in_batches(16, 15, |range| {
            calls.push(range.clone());
            Ok(range.collect::<Vec<usize>>())
        })
        .unwrap();

        assert_eq!(calls, vec![0..15, 15..16]);
        assert_eq!(pages, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn batching_is_invisible_in_output() {
        for total in [1usize, 14, 15, 29, 30, 47] {
            let batched = rasterise_in_batches(total, 15, |r| Ok(r.collect::<Vec<_>>())).unwrap();
            let unbatched = rasterise_in_batches(total, usize::MAX, |r| Ok(r.collect::<Vec<_>>())).unwrap();
            assert_eq!(batched, unbatched, "total={total}");
            assert_eq!(batched.len(), total);
        }
    }

    #[test]
    fn batch_error_propagates() {
        let result: Result<Vec<usize>, _> = rasterise_in_batches(20, 15, |range| {
            if range.start == 15 {
                Err(IntakeError::RasterisationFailed {
                    page: 16,
                    detail: "boom".into(),
                })
            } else {
                Ok(range.collect())
            }
        });
        assert!(matches!(
            result,
            Err(IntakeError::RasterisationFailed { page: 16, .. })
        ));
    }
}
