//! OpenRouter (OpenAI-compatible chat completions) gateway.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use narrascript_shared::{AppConfig, GatewayError, NarrascriptError, Result};

use crate::GenerationGateway;

/// Longest error body kept in a [`GatewayError::NonSuccessStatus`].
const MAX_ERROR_BODY_CHARS: usize = 2_000;

/// Everything the HTTP gateway needs, passed in explicitly.
///
/// The API key is resolved by the caller; the gateway never reads the
/// environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    /// Sent as `HTTP-Referer` when present.
    pub referer: Option<String>,
    /// Sent as `X-Title`.
    pub title: String,
}

impl GatewayConfig {
    /// Build from the `[openrouter]` config section and an already-resolved key.
    pub fn from_app_config(config: &AppConfig, api_key: impl Into<String>) -> Self {
        let section = &config.openrouter;
        Self {
            endpoint: section.endpoint.clone(),
            api_key: api_key.into(),
            model: section.default_model.clone(),
            timeout: Duration::from_secs(section.timeout_secs),
            referer: section.referer.clone(),
            title: section.title.clone(),
        }
    }
}

/// Gateway backed by an OpenRouter-style `/chat/completions` endpoint.
pub struct OpenRouterGateway {
    client: Client,
    endpoint: Url,
    model: String,
    headers: HeaderMap,
}

impl OpenRouterGateway {
    /// Validate the config and build the HTTP client.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            NarrascriptError::config(format!("invalid endpoint '{}': {e}", config.endpoint))
        })?;

        if config.api_key.trim().is_empty() {
            return Err(NarrascriptError::config("API key is empty"));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("narrascript/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NarrascriptError::config(format!("failed to build HTTP client: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            header_value(&format!("Bearer {}", config.api_key.trim()), "API key")?,
        );
        if let Some(referer) = &config.referer {
            headers.insert(
                HeaderName::from_static("http-referer"),
                header_value(referer, "referer")?,
            );
        }
        if !config.title.is_empty() {
            headers.insert(
                HeaderName::from_static("x-title"),
                header_value(&config.title, "title")?,
            );
        }

        Ok(Self {
            client,
            endpoint,
            model: config.model,
            headers,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn header_value(value: &str, what: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| {
        NarrascriptError::config(format!(
            "{what} contains characters not allowed in an HTTP header"
        ))
    })
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    /// Some providers report failures inside a 200 body.
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

// ---------------------------------------------------------------------------
// GenerationGateway
// ---------------------------------------------------------------------------

#[async_trait]
impl GenerationGateway for OpenRouterGateway {
    #[instrument(skip_all, fields(model = %self.model, prompt_chars = prompt.len()))]
    async fn generate(&self, prompt: &str) -> std::result::Result<String, GatewayError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let started = Instant::now();
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        debug!(
            status = status.as_u16(),
            bytes = text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "response received"
        );

        if !status.is_success() {
            return Err(GatewayError::NonSuccessStatus {
                code: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY_CHARS),
            });
        }

        extract_content(&text)
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::TransportFailure(e.to_string())
    }
}

/// Pull `choices[0].message.content` out of a 2xx body.
fn extract_content(body: &str) -> std::result::Result<String, GatewayError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| GatewayError::MalformedResponse(format!("invalid JSON: {e}")))?;

    if let Some(error) = parsed.error {
        return Err(GatewayError::MalformedResponse(format!(
            "backend reported an error: {}",
            error.message
        )));
    }

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| GatewayError::MalformedResponse("missing choices[0].message.content".into()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
