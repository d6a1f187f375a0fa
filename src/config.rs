//! Configuration for the digitisation pipeline.
//!
//! Everything the pipeline consumes is held in [`DigitizerConfig`], built via
//! its [`DigitizerConfigBuilder`] or loaded from `DOCSCRIBE_*` environment
//! variables with [`DigitizerConfig::from_env`].
//!
//! The model families each get a [`BackendSettings`] block: base URL, API
//! key, request timeout, service-start timeout, per-model endpoint overrides,
//! and the model → container bindings the service controller manages.

use crate::error::DigitizeError;
use crate::family::ModelFamily;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Model ids served by the generic backend out of the box.
pub const DEFAULT_GENERIC_MODELS: [&str; 8] = [
    "Qwen/Qwen3-VL-2B-Instruct",
    "Qwen/Qwen3-VL-4B-Instruct",
    "Qwen/Qwen3-VL-8B-Instruct",
    "Qwen/Qwen3-VL-32B-Instruct",
    "Qwen/Qwen3-VL-2B-Instruct-FP8",
    "Qwen/Qwen3-VL-4B-Instruct-FP8",
    "Qwen/Qwen3-VL-8B-Instruct-FP8",
    "Qwen/Qwen3-VL-32B-Instruct-FP8",
];

pub const DEFAULT_MODEL: &str = "Qwen/Qwen3-VL-4B-Instruct";

/// Configuration for digitisation.
///
/// # Example
/// ```rust
/// use docscribe::DigitizerConfig;
///
/// let config = DigitizerConfig::builder()
///     .math_html_models(["datalab-to/chandra"])
///     .bind_container("datalab-to/chandra", "chandra-ocr")
///     .max_tokens(4096)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct DigitizerConfig {
    /// Model used when a request names none.
    pub default_model: String,

    /// Family membership lists. Together they form the model allow-list.
    pub families: FamilyRegistry,

    pub generic: BackendSettings,
    pub structured: BackendSettings,
    pub math_html: BackendSettings,

    /// Delay between readiness probes, in seconds. Floored at 0.5 when used.
    pub poll_interval_secs: f64,

    /// Path appended to the base URL for readiness probes. Default: `/v1/models`.
    pub ready_path: String,

    /// Completion token budget per inference call. Default: 2048.
    ///
    /// Dense scanned pages with tables routinely exceed 1 000 output tokens;
    /// too low a budget truncates mid-sentence without any error.
    pub max_tokens: u32,

    /// Maximum number of PDF pages rasterised per document. Default: 20.
    pub page_limit: usize,

    /// Rasterisation DPI for PDF pages. Default: 300.
    pub dpi: u32,

    /// Container CLI used by [`crate::service::DockerCli`]. Default: `docker`.
    pub docker_binary: String,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for DigitizerConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            families: FamilyRegistry::default(),
            generic: BackendSettings::new("http://vllm:8000").with_start_timeout(240.0),
            structured: BackendSettings::new("http://deepseek-ocr:8000"),
            math_html: BackendSettings::new("http://chandra-ocr:8000").with_start_timeout(600.0),
            poll_interval_secs: 2.0,
            ready_path: "/v1/models".to_string(),
            max_tokens: 2048,
            page_limit: 20,
            dpi: 300,
            docker_binary: "docker".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DigitizerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigitizerConfig")
            .field("default_model", &self.default_model)
            .field("families", &self.families)
            .field("generic", &self.generic)
            .field("structured", &self.structured)
            .field("math_html", &self.math_html)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("ready_path", &self.ready_path)
            .field("max_tokens", &self.max_tokens)
            .field("page_limit", &self.page_limit)
            .field("dpi", &self.dpi)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn DigitizationProgressCallback>"),
            )
            .finish()
    }
}

/// Where and how one family's backend is reached.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL of the OpenAI-compatible server, without `/v1/...`.
    pub base_url: String,
    /// Bearer token sent as `Authorization`, if any.
    pub api_key: Option<String>,
    /// Hard upper bound on one inference request. Default: 300.
    pub request_timeout_secs: f64,
    /// How long a freshly started container may take to pass its readiness
    /// probe. `None` falls back to the generic family's value.
    pub service_start_timeout_secs: Option<f64>,
    /// Per-model base URL overrides.
    pub model_endpoints: HashMap<String, String>,
    /// Model id → container name for models whose container is managed.
    pub service_names: HashMap<String, String>,
}

impl BackendSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            request_timeout_secs: 300.0,
            service_start_timeout_secs: None,
            model_endpoints: HashMap::new(),
            service_names: HashMap::new(),
        }
    }

    pub fn with_start_timeout(mut self, secs: f64) -> Self {
        self.service_start_timeout_secs = Some(secs);
        self
    }
}

impl fmt::Debug for BackendSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("service_start_timeout_secs", &self.service_start_timeout_secs)
            .field("model_endpoints", &self.model_endpoints)
            .field("service_names", &self.service_names)
            .finish()
    }
}

/// Static family membership lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyRegistry {
    pub generic: Vec<String>,
    pub structured: Vec<String>,
    pub math_html: Vec<String>,
}

impl Default for FamilyRegistry {
    fn default() -> Self {
        Self {
            generic: DEFAULT_GENERIC_MODELS.iter().map(|s| s.to_string()).collect(),
            structured: Vec::new(),
            math_html: Vec::new(),
        }
    }
}

impl FamilyRegistry {
    /// Classify a model id. Ids in neither transcriber list are generic.
    pub fn family_of(&self, model_id: &str) -> ModelFamily {
        if self.structured.iter().any(|m| m == model_id) {
            ModelFamily::StructuredTranscriber
        } else if self.math_html.iter().any(|m| m == model_id) {
            ModelFamily::MathHtmlTranscriber
        } else {
            ModelFamily::Generic
        }
    }

    /// All configured ids, generic first.
    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.generic
            .iter()
            .chain(&self.structured)
            .chain(&self.math_html)
            .map(String::as_str)
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.all().any(|m| m == model_id)
    }
}

/// Resolved connection parameters for one model.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    /// Base URL with any trailing `/` removed.
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl DigitizerConfig {
    /// Create a new builder for `DigitizerConfig`.
    pub fn builder() -> DigitizerConfigBuilder {
        DigitizerConfigBuilder {
            config: Self::default(),
        }
    }

    /// Builder seeded with this configuration, for layering overrides.
    pub fn into_builder(self) -> DigitizerConfigBuilder {
        DigitizerConfigBuilder { config: self }
    }

    pub fn family_of(&self, model_id: &str) -> ModelFamily {
        self.families.family_of(model_id)
    }

    /// Backend settings for a family.
    pub fn backend(&self, family: ModelFamily) -> &BackendSettings {
        match family {
            ModelFamily::Generic => &self.generic,
            ModelFamily::StructuredTranscriber => &self.structured,
            ModelFamily::MathHtmlTranscriber => &self.math_html,
        }
    }

    pub fn available_models(&self) -> Vec<String> {
        self.families.all().map(str::to_string).collect()
    }

    /// Whether `model_id` may be requested. An empty allow-list admits everything.
    pub fn is_allowed(&self, model_id: &str) -> bool {
        self.families.all().next().is_none() || self.families.contains(model_id)
    }

    /// Resolve the base URL, API key, and request timeout for a model.
    pub fn endpoint(&self, model_id: &str) -> Result<Endpoint, DigitizeError> {
        let backend = self.backend(self.family_of(model_id));
        let base_url = backend
            .model_endpoints
            .get(model_id)
            .map(String::as_str)
            .unwrap_or(&backend.base_url)
            .trim()
            .trim_end_matches('/')
            .to_string();
        if base_url.is_empty() {
            return Err(DigitizeError::InvalidConfig(format!(
                "no inference base URL configured for model '{model_id}'"
            )));
        }
        let api_key = backend
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);
        Ok(Endpoint {
            base_url,
            api_key,
            timeout: secs_to_duration(backend.request_timeout_secs),
        })
    }

    /// Union of every family's model → container bindings.
    ///
    /// Later families win on duplicate keys: generic, then structured, then math-html.
    pub fn service_bindings(&self) -> HashMap<String, String> {
        let mut combined = self.generic.service_names.clone();
        combined.extend(self.structured.service_names.clone());
        combined.extend(self.math_html.service_names.clone());
        combined
    }

    /// How long a started container for `model_id` may take to become ready.
    pub fn service_start_timeout(&self, model_id: &str) -> Duration {
        let fallback = self.generic.service_start_timeout_secs.unwrap_or(240.0);
        let secs = self
            .backend(self.family_of(model_id))
            .service_start_timeout_secs
            .unwrap_or(fallback);
        secs_to_duration(secs)
    }

    /// Delay between readiness probes, never below half a second.
    pub fn poll_interval(&self) -> Duration {
        secs_to_duration(self.poll_interval_secs.max(0.5))
    }

    /// Load configuration from `DOCSCRIBE_*` environment variables on top of the defaults.
    pub fn from_env() -> Result<Self, DigitizeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`], reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DigitizeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut b = Self::builder();

        for (family, prefix) in [
            (ModelFamily::Generic, "DOCSCRIBE_GENERIC"),
            (ModelFamily::StructuredTranscriber, "DOCSCRIBE_STRUCTURED"),
            (ModelFamily::MathHtmlTranscriber, "DOCSCRIBE_MATH_HTML"),
        ] {
            if let Some(v) = get(&format!("{prefix}_MODELS")) {
                let models = parse_model_list(&v);
                b.config.families.set(family, models);
            }
            let backend = b.config.backend_mut(family);
            if let Some(v) = get(&format!("{prefix}_BASE_URL")) {
                backend.base_url = v.trim().to_string();
            }
            if let Some(v) = get(&format!("{prefix}_API_KEY")) {
                backend.api_key = Some(v.trim().to_string());
            }
            if let Some(v) = get(&format!("{prefix}_REQUEST_TIMEOUT_SECS")) {
                backend.request_timeout_secs = parse_number(&format!("{prefix}_REQUEST_TIMEOUT_SECS"), &v)?;
            }
            if let Some(v) = get(&format!("{prefix}_START_TIMEOUT_SECS")) {
                backend.service_start_timeout_secs =
                    Some(parse_number(&format!("{prefix}_START_TIMEOUT_SECS"), &v)?);
            }
            if let Some(v) = get(&format!("{prefix}_MODEL_ENDPOINTS")) {
                backend.model_endpoints = parse_string_map(&format!("{prefix}_MODEL_ENDPOINTS"), &v)?;
            }
            if let Some(v) = get(&format!("{prefix}_SERVICE_NAMES")) {
                backend.service_names = parse_string_map(&format!("{prefix}_SERVICE_NAMES"), &v)?;
            }
        }

        if let Some(v) = get("DOCSCRIBE_DEFAULT_MODEL") {
            b = b.default_model(v.trim());
        }
        if let Some(v) = get("DOCSCRIBE_MAX_TOKENS") {
            b = b.max_tokens(parse_number("DOCSCRIBE_MAX_TOKENS", &v)?);
        }
        if let Some(v) = get("DOCSCRIBE_PAGE_LIMIT") {
            b = b.page_limit(parse_number("DOCSCRIBE_PAGE_LIMIT", &v)?);
        }
        if let Some(v) = get("DOCSCRIBE_DPI") {
            b = b.dpi(parse_number("DOCSCRIBE_DPI", &v)?);
        }
        if let Some(v) = get("DOCSCRIBE_POLL_INTERVAL_SECS") {
            b = b.poll_interval_secs(parse_number("DOCSCRIBE_POLL_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = get("DOCSCRIBE_READY_PATH") {
            b = b.ready_path(v.trim());
        }
        if let Some(v) = get("DOCSCRIBE_DOCKER_BINARY") {
            b = b.docker_binary(v.trim());
        }

        b.build()
    }

    fn backend_mut(&mut self, family: ModelFamily) -> &mut BackendSettings {
        match family {
            ModelFamily::Generic => &mut self.generic,
            ModelFamily::StructuredTranscriber => &mut self.structured,
            ModelFamily::MathHtmlTranscriber => &mut self.math_html,
        }
    }
}

impl FamilyRegistry {
    fn set(&mut self, family: ModelFamily, models: Vec<String>) {
        match family {
            ModelFamily::Generic => self.generic = models,
            ModelFamily::StructuredTranscriber => self.structured = models,
            ModelFamily::MathHtmlTranscriber => self.math_html = models,
        }
    }
}

/// Builder for [`DigitizerConfig`].
pub struct DigitizerConfigBuilder {
    config: DigitizerConfig,
}

impl fmt::Debug for DigitizerConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigitizerConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl DigitizerConfigBuilder {
    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.config.default_model = model.into();
        self
    }

    pub fn generic_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.families.generic = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn structured_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.families.structured = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn math_html_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.families.math_html = models.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the backend settings for one family.
    pub fn backend(mut self, family: ModelFamily, settings: BackendSettings) -> Self {
        *self.config.backend_mut(family) = settings;
        self
    }

    /// Point a family at a different base URL.
    pub fn base_url(mut self, family: ModelFamily, url: impl Into<String>) -> Self {
        self.config.backend_mut(family).base_url = url.into();
        self
    }

    /// Route one model to its own base URL.
    pub fn model_endpoint(mut self, model: impl Into<String>, url: impl Into<String>) -> Self {
        let model = model.into();
        let family = self.config.family_of(&model);
        self.config
            .backend_mut(family)
            .model_endpoints
            .insert(model, url.into());
        self
    }

    /// Put a model's container under service control.
    ///
    /// The binding is stored in the family the model currently classifies
    /// as, so set the family lists first.
    pub fn bind_container(mut self, model: impl Into<String>, container: impl Into<String>) -> Self {
        let model = model.into();
        let family = self.config.family_of(&model);
        self.config
            .backend_mut(family)
            .service_names
            .insert(model, container.into());
        self
    }

    pub fn poll_interval_secs(mut self, secs: f64) -> Self {
        self.config.poll_interval_secs = secs;
        self
    }

    pub fn ready_path(mut self, path: impl Into<String>) -> Self {
        self.config.ready_path = path.into();
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn page_limit(mut self, n: usize) -> Self {
        self.config.page_limit = n;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn docker_binary(mut self, bin: impl Into<String>) -> Self {
        self.config.docker_binary = bin.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DigitizerConfig, DigitizeError> {
        let c = &self.config;
        for family in ModelFamily::ALL {
            if c.backend(family).base_url.trim().is_empty() {
                return Err(DigitizeError::InvalidConfig(format!(
                    "base URL for the {family} backend must not be empty"
                )));
            }
        }
        if c.max_tokens == 0 {
            return Err(DigitizeError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.page_limit == 0 {
            return Err(DigitizeError::InvalidConfig("page_limit must be ≥ 1".into()));
        }
        if !(72..=600).contains(&c.dpi) {
            return Err(DigitizeError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        for family in ModelFamily::ALL {
            let backend = c.backend(family);
            check_timeout(&format!("{family} request timeout"), backend.request_timeout_secs)?;
            if let Some(secs) = backend.service_start_timeout_secs {
                check_timeout(&format!("{family} service start timeout"), secs)?;
            }
        }
        if !c.poll_interval_secs.is_finite()
            || c.poll_interval_secs < 0.0
            || c.poll_interval_secs > MAX_TIMEOUT_SECS
        {
            return Err(DigitizeError::InvalidConfig(format!(
                "poll interval must be a non-negative number of seconds, got {}",
                c.poll_interval_secs
            )));
        }
        if !c.is_allowed(&c.default_model) {
            return Err(DigitizeError::InvalidConfig(format!(
                "default model '{}' is not in the configured model lists",
                c.default_model
            )));
        }
        Ok(self.config)
    }
}

// ── Parsing helpers ──────────────────────────────────────────────────────

/// Upper bound for any configured timeout or interval: one day.
const MAX_TIMEOUT_SECS: f64 = 86_400.0;

fn check_timeout(what: &str, secs: f64) -> Result<(), DigitizeError> {
    if secs.is_finite() && secs > 0.0 && secs <= MAX_TIMEOUT_SECS {
        Ok(())
    } else {
        Err(DigitizeError::InvalidConfig(format!(
            "{what} must be between 0 and {MAX_TIMEOUT_SECS} seconds, got {secs}"
        )))
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

fn parse_model_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, DigitizeError> {
    value
        .trim()
        .parse()
        .map_err(|_| DigitizeError::InvalidConfig(format!("{key} is not a valid number: '{value}'")))
}

/// Parse a JSON object of strings, dropping entries with blank keys or values.
fn parse_string_map(key: &str, value: &str) -> Result<HashMap<String, String>, DigitizeError> {
    let parsed: HashMap<String, serde_json::Value> = serde_json::from_str(value)
        .map_err(|e| DigitizeError::InvalidConfig(format!("{key} must be a JSON object: {e}")))?;
    Ok(parsed
        .into_iter()
        .filter_map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            let (k, v) = (k.trim().to_string(), v.trim().to_string());
            (!k.is_empty() && !v.is_empty()).then_some((k, v))
        })
        .collect())
}
