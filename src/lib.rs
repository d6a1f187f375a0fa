//! # docscribe
//!
//! Digitise scanned documents (PDF or image) into Markdown, LaTeX, or an
//! editable page layout using self-hosted vision-language models.
//!
//! ## Why this crate?
//!
//! Several open transcription models are good at different things: a
//! general VLM for mixed pages, a dedicated OCR transcriber for dense text,
//! a math-aware transcriber that emits `<math>` tags. They rarely fit on the
//! same GPU together, and each answers in its own dialect. This crate keeps
//! exactly one model container resident, sends it the page images, and
//! normalises whatever comes back into the format the caller asked for.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file
//!  │
//!  ├─ 1. Render     rasterise PDF pages via pdfium / decode the image
//!  ├─ 2. Prompt     pick the template for (format, model family, page)
//!  ├─ 3. Service    start the model's container, stop the others, wait for ready
//!  ├─ 4. Invoke     OpenAI-compatible chat completion with the page images
//!  ├─ 5. Normalise  family postprocessing (math tags, HTML → Markdown → LaTeX)
//!  └─ 6. Output     ordered PageConversions + timings
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docscribe::{Digitizer, DigitizerConfig, TargetFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DigitizerConfig::from_env()?;
//!     let digitizer = Digitizer::new(config)?;
//!     let result = digitizer
//!         .digitalize_file("scan.pdf", TargetFormat::Latex, None)
//!         .await?;
//!     println!("{}", result.joined_text());
//!     eprintln!("{} page(s) in {:.1}s", result.pages.len(), result.total_seconds);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docscribe` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docscribe = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod digitize;
pub mod error;
pub mod family;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod service;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BackendSettings, DigitizerConfig, DigitizerConfigBuilder, Endpoint, FamilyRegistry};
pub use digitize::Digitizer;
pub use error::DigitizeError;
pub use family::{FamilyProfile, ModelFamily, TargetFormat};
pub use output::{
    ConversionRecord, DigitizationResult, LayoutDocument, PageConversion, PreparedImage,
    RasterizedDocument, SourceKind,
};
pub use pipeline::render::{rasterize_bytes, rasterize_file};
pub use progress::{DigitizationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::build_prompt;
pub use service::{ContainerRuntime, ContainerStatus, DockerCli, ModelServiceController, RuntimeError};
