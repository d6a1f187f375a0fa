//! Inference: one multimodal chat-completion request per call.
//!
//! Every backend speaks the OpenAI-compatible `/v1/chat/completions` API.
//! The request is a single user message holding the page images (as PNG
//! data URIs, in page order) followed by the prompt text, sampled at
//! temperature 0 so repeated runs transcribe identically.
//!
//! There is no retry here. A transport failure, a non-200 status or a body
//! without `choices[0].message.content` ends the call with the matching
//! [`DigitizeError`] variant, and the orchestrator aborts the document.

use crate::config::Endpoint;
use crate::error::DigitizeError;
use crate::pipeline::encode::to_data_uri;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, error};

/// Longest backend error body kept in [`DigitizeError::BackendError`].
const MAX_ERROR_BODY_CHARS: usize = 500;

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    ImageUrl { image_url: ImageUrl },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

fn build_request<'a>(
    model_id: &'a str,
    images: &[&[u8]],
    prompt: &'a str,
    max_tokens: u32,
) -> ChatRequest<'a> {
    let mut content: Vec<ContentPart<'a>> = images
        .iter()
        .map(|png| ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: to_data_uri(png),
            },
        })
        .collect();
    content.push(ContentPart::Text { text: prompt });

    ChatRequest {
        model: model_id,
        messages: vec![ChatMessage {
            role: "user",
            content,
        }],
        max_tokens,
        temperature: 0.0,
    }
}

// ── Invoker ──────────────────────────────────────────────────────────────────

/// Generated text and how long the request took.
#[derive(Debug, Clone)]
pub struct Generation {
    /// Trimmed `choices[0].message.content`.
    pub content: String,
    pub inference_seconds: f64,
}

/// Sends chat-completion requests to inference backends.
#[derive(Debug, Clone)]
pub struct InferenceInvoker {
    client: reqwest::Client,
    max_tokens: u32,
}

impl InferenceInvoker {
    pub fn new(max_tokens: u32) -> Result<Self, DigitizeError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| DigitizeError::Internal(format!("HTTP client init failed: {}", e)))?;
        Ok(Self { client, max_tokens })
    }

    /// Run one inference call against `endpoint`.
    ///
    /// The endpoint's timeout bounds the whole request, including reading
    /// the body.
    pub async fn invoke(
        &self,
        model_id: &str,
        endpoint: &Endpoint,
        images: &[&[u8]],
        prompt: &str,
    ) -> Result<Generation, DigitizeError> {
        let url = format!("{}/v1/chat/completions", endpoint.base_url);
        let body = build_request(model_id, images, prompt, self.max_tokens);

        let mut request = self
            .client
            .post(&url)
            .timeout(endpoint.timeout)
            .json(&body);
        if let Some(key) = &endpoint.api_key {
            request = request.bearer_auth(key);
        }

        debug!("POST {} ({} image(s), model {})", url, images.len(), model_id);
        let start = Instant::now();

        let unreachable = |e: reqwest::Error| DigitizeError::BackendUnreachable {
            model: model_id.to_string(),
            url: url.clone(),
            detail: e.to_string(),
        };

        let response = request.send().await.map_err(unreachable)?;
        let status = response.status();
        let text = response.text().await.map_err(unreachable)?;
        let inference_seconds = start.elapsed().as_secs_f64();

        if status != StatusCode::OK {
            let excerpt: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
            error!("Backend {} returned HTTP {}: {}", url, status.as_u16(), excerpt);
            return Err(DigitizeError::BackendError {
                model: model_id.to_string(),
                url,
                status: status.as_u16(),
                body: excerpt,
            });
        }

        let content = extract_content(&text).map_err(|detail| {
            error!("Malformed response from {}: {}", url, detail);
            DigitizeError::MalformedResponse {
                model: model_id.to_string(),
                url: url.clone(),
                detail,
            }
        })?;

        debug!(
            "Backend {} answered in {:.2}s ({} chars)",
            url,
            inference_seconds,
            content.len()
        );
        Ok(Generation {
            content,
            inference_seconds,
        })
    }
}

/// Pull `choices[0].message.content` out of a chat-completion body.
fn extract_content(body: &str) -> Result<String, String> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| format!("body is not JSON: {}", e))?;
    value
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| "missing string at choices[0].message.content".to_string())
}
