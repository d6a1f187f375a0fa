//! Data produced and consumed by the digitisation pipeline.
//!
//! Rasterisation hands the orchestrator a [`RasterizedDocument`]; the
//! orchestrator returns a [`DigitizationResult`] holding one
//! [`PageConversion`] per inference call, in page order.

use crate::error::DigitizeError;
use crate::family::TargetFormat;
use serde::{Deserialize, Serialize};

/// A PNG-encoded page image.
///
/// Produced once per page by rasterisation, read by the inference call, and
/// optionally moved into a [`PageConversion`] for layout output.
#[derive(Clone, PartialEq, Eq)]
pub struct PreparedImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl PreparedImage {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self { data, width, height }
    }

    /// PNG bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl std::fmt::Debug for PreparedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedImage")
            .field("bytes", &self.data.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// What kind of file the pages came from.
///
/// Only multi-page documents are split into one inference call per page; a
/// single image is always sent whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pdf,
    Image,
}

/// Ordered page images from one input file.
#[derive(Debug, Clone)]
pub struct RasterizedDocument {
    pub kind: SourceKind,
    pub pages: Vec<PreparedImage>,
}

impl RasterizedDocument {
    pub fn new(kind: SourceKind, pages: Vec<PreparedImage>) -> Self {
        Self { kind, pages }
    }

    pub fn pdf(pages: Vec<PreparedImage>) -> Self {
        Self::new(SourceKind::Pdf, pages)
    }

    pub fn image(page: PreparedImage) -> Self {
        Self::new(SourceKind::Image, vec![page])
    }

    /// Whether each page gets its own inference call.
    pub fn is_paged(&self) -> bool {
        self.kind == SourceKind::Pdf && self.pages.len() > 1
    }
}

/// Result of one inference call.
#[derive(Debug, Clone)]
pub struct PageConversion {
    /// Normalised text in the requested content format.
    pub content: String,
    /// Seconds spent starting/stopping containers and waiting for readiness.
    pub model_prepare_seconds: f64,
    /// Seconds spent in the chat-completion request.
    pub inference_seconds: f64,
    /// Source page image; present for layout requests.
    pub image: Option<PreparedImage>,
}

/// Everything one digitisation call produced.
#[derive(Debug, Clone)]
pub struct DigitizationResult {
    /// Never empty.
    pub pages: Vec<PageConversion>,
    /// Wall-clock seconds for the whole call.
    pub total_seconds: f64,
}

impl DigitizationResult {
    /// Page contents joined by a blank line.
    pub fn joined_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.content.trim_end())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn total_prepare_seconds(&self) -> f64 {
        self.pages.iter().map(|p| p.model_prepare_seconds).sum()
    }

    pub fn total_inference_seconds(&self) -> f64 {
        self.pages.iter().map(|p| p.inference_seconds).sum()
    }

    /// Build the editable layout payload: page text plus image dimensions.
    pub fn layout_document(&self) -> Result<LayoutDocument, DigitizeError> {
        let pages = self
            .pages
            .iter()
            .enumerate()
            .map(|(i, page)| {
                let image = page.image.as_ref().ok_or_else(|| DigitizeError::UnsupportedFormat {
                    format: TargetFormat::Layout.to_string(),
                    detail: format!("page {} carries no page image", i + 1),
                })?;
                Ok(LayoutPage {
                    index: i + 1,
                    text: page.content.clone(),
                    image: LayoutImage {
                        width: image.width(),
                        height: image.height(),
                    },
                })
            })
            .collect::<Result<Vec<_>, DigitizeError>>()?;
        Ok(LayoutDocument { version: 1, pages })
    }

    /// Timing summary suitable for a conversion log line.
    pub fn record(&self, model_id: &str, format: TargetFormat) -> ConversionRecord {
        ConversionRecord {
            model_id: model_id.to_string(),
            target_format: format,
            page_count: self.pages.len(),
            generation_seconds: round4(self.total_seconds),
            model_prepare_seconds: round4(self.total_prepare_seconds()),
            inference_seconds: round4(self.total_inference_seconds()),
            per_page: self
                .pages
                .iter()
                .enumerate()
                .map(|(i, p)| PageTiming {
                    index: i + 1,
                    model_prepare_seconds: round4(p.model_prepare_seconds),
                    inference_seconds: round4(p.inference_seconds),
                })
                .collect(),
        }
    }
}

/// Editable page-layout document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutDocument {
    pub version: u32,
    pub pages: Vec<LayoutPage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutPage {
    /// 1-indexed.
    pub index: usize,
    pub text: String,
    pub image: LayoutImage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutImage {
    pub width: u32,
    pub height: u32,
}

/// Per-call timing summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub model_id: String,
    pub target_format: TargetFormat,
    pub page_count: usize,
    pub generation_seconds: f64,
    pub model_prepare_seconds: f64,
    pub inference_seconds: f64,
    pub per_page: Vec<PageTiming>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageTiming {
    pub index: usize,
    pub model_prepare_seconds: f64,
    pub inference_seconds: f64,
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
