//! Pipeline stages for document digitisation.
//!
//! Each submodule implements one transformation step, so each can be tested
//! on its own and the orchestrator in [`crate::digitize`] only wires them.
//!
//! ## Data Flow
//!
//! ```text
//! file ──▶ render ──▶ encode ──▶ invoke ──▶ postprocess ──▶ (html, latex)
//!          (pdfium)   (PNG/b64)  (HTTP)     (per family)
//! ```
//!
//! 1. [`render`]: rasterise a PDF or decode an image; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 2. [`encode`]: PNG-encode pages and wrap them as data URIs
//! 3. [`invoke`]: the chat-completion request; the only stage with network I/O
//! 4. [`postprocess`]: family postprocessors and math-delimiter cleanup
//! 5. [`html`] / [`latex`]: HTML → Markdown and Markdown → LaTeX for the
//!    math-html transcriber

pub mod encode;
pub mod html;
pub mod invoke;
pub mod latex;
pub mod postprocess;
pub mod render;
