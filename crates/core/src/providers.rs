//! HTTP clients for the hosted chat APIs.
//!
//! Every call is bounded by the configured timeout. Status codes map onto
//! [`ProviderError`] so callers can tell bad credentials and exhausted quota
//! apart from other failures.

use crate::config::{DigestConfig, ProviderKind};
use crate::error::{ConfigError, ProviderError};
use crate::traits::{GenerationRequest, LlmProvider};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Builds the client for `kind`, failing when its API key is not configured.
pub fn build_provider(
    config: &DigestConfig,
    kind: ProviderKind,
) -> Result<Box<dyn LlmProvider>, ConfigError> {
    let api_key = config.api_key(kind)?.to_string();
    let base_url = config.provider_settings(kind).base_url.clone();
    let timeout = Duration::from_secs(config.timeout_secs.max(1));

    Ok(match kind {
        ProviderKind::OpenAi => Box::new(OpenAiProvider::new(base_url, api_key, timeout)),
        ProviderKind::Anthropic => Box::new(AnthropicProvider::new(base_url, api_key, timeout)),
    })
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}

/// Sends `request` and returns the decoded JSON body of a 2xx answer.
async fn send_json(
    provider: &str,
    request: RequestBuilder,
    timeout: Duration,
) -> Result<Value, ProviderError> {
    let exchange = async {
        let response = request.send().await.map_err(|error| ProviderError::Transport {
            provider: provider.to_string(),
            details: error.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(status_error(provider, status, details));
        }

        response
            .json::<Value>()
            .await
            .map_err(|error| ProviderError::InvalidResponse {
                provider: provider.to_string(),
                details: error.to_string(),
            })
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            provider: provider.to_string(),
            seconds: timeout.as_secs(),
        }),
    }
}

fn status_error(provider: &str, status: StatusCode, details: String) -> ProviderError {
    let provider = provider.to_string();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth { provider, details },
        StatusCode::TOO_MANY_REQUESTS => ProviderError::Quota { provider, details },
        _ => ProviderError::Status {
            provider,
            status: status.as_u16(),
            details,
        },
    }
}

fn missing_field(provider: &str, pointer: &str) -> ProviderError {
    ProviderError::InvalidResponse {
        provider: provider.to_string(),
        details: format!("response has no {pointer}"),
    }
}

pub struct OpenAiProvider {
    http: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        ProviderKind::OpenAi.as_str()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let payload = json!({
            "model": request.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        tracing::debug!(model = %request.model, "calling openai chat completions");

        let builder = self
            .http
            .post(endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&payload);
        let body = send_json(self.name(), builder, self.timeout).await?;

        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| missing_field(self.name(), "choices[0].message.content"))
    }
}

pub struct AnthropicProvider {
    http: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl AnthropicProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        ProviderKind::Anthropic.as_str()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let payload = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [{ "role": "user", "content": request.prompt }],
        });
        tracing::debug!(model = %request.model, "calling anthropic messages");

        let builder = self
            .http
            .post(endpoint(&self.base_url, "messages"))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload);
        let body = send_json(self.name(), builder, self.timeout).await?;

        let blocks = body
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| missing_field(self.name(), "content"))?;
        let text = blocks
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(missing_field(self.name(), "text content block"));
        }
        Ok(text.trim().to_string())
    }
}
