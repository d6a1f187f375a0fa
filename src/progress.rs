//! Progress-callback trait for per-page digitisation events.
//!
//! Inject an [`Arc<dyn DigitizationProgressCallback>`] via
//! [`crate::config::DigitizerConfigBuilder::progress_callback`] to receive
//! events as the orchestrator works through the inference calls.
//!
//! # Example
//!
//! ```rust
//! use docscribe::{DigitizationProgressCallback, DigitizerConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl DigitizationProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, content_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} done ({} chars)", page_num, total_pages, content_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = DigitizerConfig::builder()
//!     .progress_callback(counter as Arc<dyn DigitizationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator around each inference call.
///
/// A "page" here is one inference call: a multi-page PDF produces one event
/// per page, while a single image (or single-page PDF) produces exactly one.
/// All methods default to no-ops. Implementations must be `Send + Sync`
/// because one [`crate::Digitizer`] may serve several tasks at once.
pub trait DigitizationProgressCallback: Send + Sync {
    /// Called once before the first inference call.
    ///
    /// # Arguments
    /// * `total_calls`: number of inference calls that will be made
    fn on_digitization_start(&self, total_calls: usize) {
        let _ = total_calls;
    }

    /// Called before the service is prepared for a page.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page has been inferred and normalised.
    ///
    /// # Arguments
    /// * `content_len`: character count of the normalised content
    fn on_page_complete(&self, page_num: usize, total_pages: usize, content_len: usize) {
        let _ = (page_num, total_pages, content_len);
    }

    /// Called when a page fails. The digitisation call aborts right after.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once when every page succeeded.
    fn on_digitization_complete(&self, total_pages: usize, elapsed_secs: f64) {
        let _ = (total_pages, elapsed_secs);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl DigitizationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::DigitizerConfig`].
pub type ProgressCallback = Arc<dyn DigitizationProgressCallback>;
