//! Error types for the docscribe library.
//!
//! A single fatal error type, [`DigitizeError`], covers everything that can
//! stop a digitisation call: the service-control failures, the inference
//! backend failures, and the input/configuration problems around them.
//!
//! None of these are retried inside the library. A page that fails aborts
//! the whole call, and the error's `Display` output names the model, the
//! backend URL, and (where one exists) the HTTP status, so request handlers
//! can surface it verbatim.
//!
//! Container runtime failures have their own type,
//! [`crate::service::RuntimeError`], because most of them are swallowed
//! (stopping a *competing* container is advisory) and only the ones that
//! concern the *requested* container are promoted to
//! [`DigitizeError::ServiceUnavailable`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docscribe library.
#[derive(Debug, Error)]
pub enum DigitizeError {
    // ── Service control ───────────────────────────────────────────────────
    /// The container backing a model is not mapped, not found, or refused to start.
    #[error("Inference service for model '{model}' is unavailable: {detail}")]
    ServiceUnavailable {
        model: String,
        container: Option<String>,
        detail: String,
    },

    /// The readiness probe never returned HTTP 200 within the start timeout.
    #[error("Timed out after {secs}s waiting for '{model}' to become ready at {url}{}",
        .last_error.as_ref().map(|e| format!(": {e}")).unwrap_or_default())]
    ServiceTimeout {
        model: String,
        url: String,
        secs: f64,
        last_error: Option<String>,
    },

    // ── Inference backend ─────────────────────────────────────────────────
    /// The HTTP request to the backend could not be completed (connect, TLS, timeout).
    #[error("Inference backend for '{model}' at {url} is unreachable: {detail}")]
    BackendUnreachable {
        model: String,
        url: String,
        detail: String,
    },

    /// The backend answered with a non-200 status.
    #[error("Inference backend for '{model}' at {url} returned HTTP {status}: {body}")]
    BackendError {
        model: String,
        url: String,
        status: u16,
        body: String,
    },

    /// The backend answered 200 but the body is not the expected chat-completion shape.
    #[error("Malformed response from '{model}' at {url}: {detail}")]
    MalformedResponse {
        model: String,
        url: String,
        detail: String,
    },

    // ── Result / format ───────────────────────────────────────────────────
    /// Rasterisation yielded no pages, so there is nothing to digitise.
    #[error("Digitisation produced no content")]
    EmptyResult,

    /// The requested target format cannot be produced on this path.
    #[error("Unsupported target format '{format}': {detail}")]
    UnsupportedFormat { format: String, detail: String },

    /// The model id is not in any configured family allow-list.
    #[error("Unsupported model '{model}'. Available: {available}")]
    UnknownModel { model: String, available: String },

    // ── Input ─────────────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The file is neither a PDF nor an image the decoder understands.
    #[error("Unsupported input '{path}': {detail}")]
    UnsupportedSource { path: PathBuf, detail: String },

    /// pdfium or the image encoder failed for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Install libpdfium on the library search path or set PDFIUM_LIB_PATH=/path/to/libpdfium."
    )]
    PdfiumBindingFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or environment validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DigitizeError {
    /// HTTP status reported by the backend, when the failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            DigitizeError::BackendError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The model id the failure concerns, when there is one.
    pub fn model(&self) -> Option<&str> {
        match self {
            DigitizeError::ServiceUnavailable { model, .. }
            | DigitizeError::ServiceTimeout { model, .. }
            | DigitizeError::BackendUnreachable { model, .. }
            | DigitizeError::BackendError { model, .. }
            | DigitizeError::MalformedResponse { model, .. }
            | DigitizeError::UnknownModel { model, .. } => Some(model),
            _ => None,
        }
    }
}
