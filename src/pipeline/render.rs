//! Rasterisation: turn an input file into PNG page images.
//!
//! PDFs are rendered page by page through pdfium at `dpi / 72` scale, capped
//! at the configured page limit. Anything else is decoded as a single image.
//! Both run inside `spawn_blocking`: pdfium keeps thread-local state and is
//! not async-safe, and decoding a large scan is CPU-bound.

use crate::config::DigitizerConfig;
use crate::error::DigitizeError;
use crate::output::{PreparedImage, RasterizedDocument, SourceKind};
use crate::pipeline::encode::encode_png;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Rasterise a PDF or image file.
pub async fn rasterize_file(
    path: &Path,
    config: &DigitizerConfig,
) -> Result<RasterizedDocument, DigitizeError> {
    if !path.exists() {
        return Err(DigitizeError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let path = path.to_path_buf();
    let dpi = config.dpi;
    let page_limit = config.page_limit;

    tokio::task::spawn_blocking(move || {
        if is_pdf_path(&path)? {
            let pages = render_pdf(PdfSource::File(&path), dpi, page_limit)?;
            Ok(RasterizedDocument::pdf(pages))
        } else {
            let img = image::open(&path).map_err(|e| DigitizeError::UnsupportedSource {
                path: path.clone(),
                detail: e.to_string(),
            })?;
            Ok(RasterizedDocument::image(encode(&img, 1)?))
        }
    })
    .await
    .map_err(|e| DigitizeError::Internal(format!("Render task panicked: {}", e)))?
}

/// Rasterise an in-memory PDF or image.
pub async fn rasterize_bytes(
    bytes: Vec<u8>,
    kind: SourceKind,
    config: &DigitizerConfig,
) -> Result<RasterizedDocument, DigitizeError> {
    let dpi = config.dpi;
    let page_limit = config.page_limit;

    tokio::task::spawn_blocking(move || match kind {
        SourceKind::Pdf => {
            let pages = render_pdf(PdfSource::Bytes(&bytes), dpi, page_limit)?;
            Ok(RasterizedDocument::pdf(pages))
        }
        SourceKind::Image => {
            let img = image::load_from_memory(&bytes).map_err(|e| DigitizeError::UnsupportedSource {
                path: PathBuf::from("<memory>"),
                detail: e.to_string(),
            })?;
            Ok(RasterizedDocument::image(encode(&img, 1)?))
        }
    })
    .await
    .map_err(|e| DigitizeError::Internal(format!("Render task panicked: {}", e)))?
}

/// PDF by extension, or by `%PDF` magic for extensionless uploads.
fn is_pdf_path(path: &Path) -> Result<bool, DigitizeError> {
    let by_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if by_ext {
        return Ok(true);
    }
    use std::io::Read;
    let mut f = std::fs::File::open(path).map_err(|e| DigitizeError::UnsupportedSource {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let mut magic = [0u8; 4];
    Ok(f.read_exact(&mut magic).is_ok() && &magic == b"%PDF")
}

enum PdfSource<'a> {
    File(&'a Path),
    Bytes(&'a [u8]),
}

fn bind_pdfium() -> Result<Pdfium, DigitizeError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(lib) if !lib.trim().is_empty() => Pdfium::bind_to_library(lib.trim()),
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| DigitizeError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn render_pdf(
    source: PdfSource<'_>,
    dpi: u32,
    page_limit: usize,
) -> Result<Vec<PreparedImage>, DigitizeError> {
    let pdfium = bind_pdfium()?;
    let (label, document) = match source {
        PdfSource::File(path) => (path.to_path_buf(), pdfium.load_pdf_from_file(path, None)),
        PdfSource::Bytes(bytes) => (PathBuf::from("<memory>"), pdfium.load_pdf_from_byte_slice(bytes, None)),
    };
    let document = document.map_err(|e| DigitizeError::UnsupportedSource {
        path: label,
        detail: format!("{:?}", e),
    })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    let count = total.min(page_limit);
    info!("PDF loaded: {} pages, rendering {}", total, count);

    let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);

    let mut out = Vec::with_capacity(count);
    for idx in 0..count {
        let page = pages
            .get(idx as u16)
            .map_err(|e| DigitizeError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            DigitizeError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;
        let image = bitmap.as_image();
        debug!("Rendered page {} → {}x{} px", idx + 1, image.width(), image.height());
        out.push(encode(&image, idx + 1)?);
    }

    if out.is_empty() {
        return Err(DigitizeError::EmptyResult);
    }
    Ok(out)
}

fn encode(img: &image::DynamicImage, page: usize) -> Result<PreparedImage, DigitizeError> {
    encode_png(img).map_err(|e| DigitizeError::RasterisationFailed {
        page,
        detail: format!("PNG encoding failed: {}", e),
    })
}
