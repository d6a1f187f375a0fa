//! Image encoding: `DynamicImage` → PNG [`PreparedImage`] → base64 data URI.
//!
//! OpenAI-compatible vision servers accept images as `data:` URIs embedded in
//! the JSON request body. PNG is used because it is lossless; JPEG artefacts
//! around glyph edges measurably hurt transcription of small print.

use crate::output::PreparedImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// PNG-encode a rendered page as RGB.
///
/// Alpha is dropped: some servers reject RGBA input and scans carry no
/// transparency anyway.
pub fn encode_png(img: &DynamicImage) -> Result<PreparedImage, image::ImageError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} page → {} PNG bytes", rgb.width(), rgb.height(), buf.len());
    Ok(PreparedImage::new(buf, rgb.width(), rgb.height()))
}

/// Wrap PNG bytes as a `data:image/png;base64,…` URI.
pub fn to_data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}
