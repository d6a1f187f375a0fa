//! Top-level digitisation entry points.
//!
//! [`Digitizer`] wires the pipeline stages together:
//!
//! ```text
//! RasterizedDocument
//!   └─ for each call (one per page, or one for the whole input)
//!        prompt ─▶ ensure service ready ─▶ invoke ─▶ postprocess ─▶ PageConversion
//! ```
//!
//! Pages are processed sequentially. The first failing call aborts the
//! request; there is no partial result.

use crate::config::{DigitizerConfig, Endpoint};
use crate::error::DigitizeError;
use crate::family::{ModelFamily, TargetFormat};
use crate::output::{DigitizationResult, PageConversion, PreparedImage, RasterizedDocument};
use crate::pipeline::invoke::InferenceInvoker;
use crate::pipeline::postprocess::normalize_markdown_math;
use crate::pipeline::render::rasterize_file;
use crate::prompts::build_prompt;
use crate::service::{ContainerRuntime, DockerCli, ModelServiceController};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Digitises rasterised documents with a configured set of model backends.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct Digitizer {
    config: Arc<DigitizerConfig>,
    controller: ModelServiceController,
    invoker: InferenceInvoker,
}

/// Everything one inference call needs that does not change between pages.
struct CallContext<'a> {
    model_id: &'a str,
    family: ModelFamily,
    format: TargetFormat,
    endpoint: Endpoint,
    bindings: HashMap<String, String>,
}

impl Digitizer {
    /// Digitizer controlling containers through the configured docker binary.
    pub fn new(config: DigitizerConfig) -> Result<Self, DigitizeError> {
        let runtime = Arc::new(DockerCli::new(config.docker_binary.clone()));
        Self::with_runtime(config, runtime)
    }

    /// Digitizer controlling containers through `runtime`.
    pub fn with_runtime(
        config: DigitizerConfig,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self, DigitizeError> {
        let config = Arc::new(config);
        let controller = ModelServiceController::new(runtime, Arc::clone(&config))?;
        Self::with_controller(config, controller)
    }

    /// Digitizer using an existing controller, e.g. one sharing its lock
    /// with other digitizers.
    pub fn with_controller(
        config: Arc<DigitizerConfig>,
        controller: ModelServiceController,
    ) -> Result<Self, DigitizeError> {
        let invoker = InferenceInvoker::new(config.max_tokens)?;
        Ok(Self {
            config,
            controller,
            invoker,
        })
    }

    pub fn config(&self) -> &DigitizerConfig {
        &self.config
    }

    pub fn controller(&self) -> &ModelServiceController {
        &self.controller
    }

    /// Check `model_id` against the allow-list, or fall back to the default model.
    pub fn resolve_model<'a>(&'a self, model_id: Option<&'a str>) -> Result<&'a str, DigitizeError> {
        let model = model_id.unwrap_or(&self.config.default_model);
        if self.config.is_allowed(model) {
            Ok(model)
        } else {
            Err(DigitizeError::UnknownModel {
                model: model.to_string(),
                available: self.config.available_models().join(", "),
            })
        }
    }

    /// Digitise already-rasterised pages.
    ///
    /// A multi-page PDF gets one inference call per page, each prompt pinned
    /// to its page; anything else is sent as a single call with all images.
    pub async fn digitalize(
        &self,
        document: RasterizedDocument,
        format: TargetFormat,
        model_id: &str,
    ) -> Result<DigitizationResult, DigitizeError> {
        let start = Instant::now();
        if document.pages.is_empty() {
            return Err(DigitizeError::EmptyResult);
        }
        let model_id = self.resolve_model(Some(model_id))?;
        let family = self.config.family_of(model_id);

        let ctx = CallContext {
            model_id,
            family,
            format,
            endpoint: self.config.endpoint(model_id)?,
            bindings: self.config.service_bindings(),
        };

        let paged = document.is_paged();
        let total_calls = if paged { document.pages.len() } else { 1 };
        info!(
            "Digitising {} page(s) as {} with '{}' ({} family, {} call(s))",
            document.pages.len(),
            format,
            model_id,
            family,
            total_calls
        );

        let cb = self.config.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_digitization_start(total_calls);
        }

        let mut pages = Vec::with_capacity(total_calls);
        if paged {
            for (idx, image) in document.pages.into_iter().enumerate() {
                let page_num = idx + 1;
                let result = self
                    .run_call(&ctx, &[image.data()], Some((page_num, total_calls)))
                    .await;
                let conversion = result.map(|c| self.attach_image(c, format, Some(image)));
                pages.push(self.report(conversion, page_num, total_calls)?);
            }
        } else {
            let images: Vec<&[u8]> = document.pages.iter().map(PreparedImage::data).collect();
            let conversion = self.run_call(&ctx, &images, None).await;
            let first = document.pages.into_iter().next();
            let conversion = conversion.map(|c| self.attach_image(c, format, first));
            pages.push(self.report(conversion, 1, 1)?);
        }

        let total_seconds = start.elapsed().as_secs_f64();
        info!(
            "Digitisation complete: {} page(s) in {:.2}s",
            pages.len(),
            total_seconds
        );
        if let Some(cb) = cb {
            cb.on_digitization_complete(pages.len(), total_seconds);
        }

        Ok(DigitizationResult {
            pages,
            total_seconds,
        })
    }

    /// Rasterise `path` and digitise it. `model_id` defaults to the configured default model.
    pub async fn digitalize_file(
        &self,
        path: impl AsRef<Path>,
        format: TargetFormat,
        model_id: Option<&str>,
    ) -> Result<DigitizationResult, DigitizeError> {
        let model_id = self.resolve_model(model_id)?;
        let document = rasterize_file(path.as_ref(), &self.config).await?;
        self.digitalize(document, format, model_id).await
    }

    /// Blocking wrapper around [`Self::digitalize_file`] for non-async callers.
    pub fn digitalize_sync(
        &self,
        path: impl AsRef<Path>,
        format: TargetFormat,
        model_id: Option<&str>,
    ) -> Result<DigitizationResult, DigitizeError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| DigitizeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.digitalize_file(path, format, model_id))
    }

    async fn run_call(
        &self,
        ctx: &CallContext<'_>,
        images: &[&[u8]],
        position: Option<(usize, usize)>,
    ) -> Result<PageConversion, DigitizeError> {
        if let Some(cb) = &self.config.progress_callback {
            let (page, total) = position.unwrap_or((1, 1));
            cb.on_page_start(page, total);
        }

        let prompt = build_prompt(
            ctx.format,
            ctx.family,
            position.map(|(page, _)| page),
            position.map(|(_, total)| total),
        );

        let model_prepare_seconds = self
            .controller
            .ensure_ready(
                ctx.model_id,
                &ctx.endpoint.base_url,
                &ctx.bindings,
                &self.config.ready_path,
            )
            .await?;

        let generation = self
            .invoker
            .invoke(ctx.model_id, &ctx.endpoint, images, &prompt)
            .await?;

        let content = normalize(&generation.content, ctx.family, ctx.format)?;
        debug!(
            "Call {:?}: {} raw chars → {} normalised chars",
            position,
            generation.content.len(),
            content.len()
        );

        Ok(PageConversion {
            content,
            model_prepare_seconds,
            inference_seconds: generation.inference_seconds,
            image: None,
        })
    }

    fn attach_image(
        &self,
        mut conversion: PageConversion,
        format: TargetFormat,
        image: Option<PreparedImage>,
    ) -> PageConversion {
        if format == TargetFormat::Layout {
            conversion.image = image;
        }
        conversion
    }

    fn report(
        &self,
        conversion: Result<PageConversion, DigitizeError>,
        page_num: usize,
        total: usize,
    ) -> Result<PageConversion, DigitizeError> {
        let cb = self.config.progress_callback.as_ref();
        match conversion {
            Ok(c) => {
                if let Some(cb) = cb {
                    cb.on_page_complete(page_num, total, c.content.chars().count());
                }
                Ok(c)
            }
            Err(e) => {
                warn!("Page {}/{} failed: {}", page_num, total, e);
                if let Some(cb) = cb {
                    cb.on_page_error(page_num, total, &e.to_string());
                }
                Err(e)
            }
        }
    }
}

/// Family postprocessing, then math-delimiter cleanup where the family wants it.
fn normalize(raw: &str, family: ModelFamily, format: TargetFormat) -> Result<String, DigitizeError> {
    let profile = family.profile();
    let content_format = format.content_format();
    let content = (profile.postprocess)(raw, content_format)?;
    if profile.normalize_math && content_format == TargetFormat::Markdown {
        Ok(normalize_markdown_math(&content))
    } else {
        Ok(content)
    }
}
