use std::time::Duration;

use async_trait::async_trait;
use quorum_models::ProviderConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{api_key_from_env, read_http_body, transport_error, CompletionRequest, LlmProvider};
use crate::error::LlmError;

pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic Messages API. There is no JSON mode, so JSON requests get the
/// JSON instruction appended to the system prompt.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: Client,
    name: String,
    model: String,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    max_tokens: u32,
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    system: String,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicProvider {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            name: name.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, LlmError> {
        let mut provider = Self::new(
            config.name.clone(),
            config.model.clone(),
            config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string()),
            api_key_from_env(config)?,
            Duration::from_secs(config.timeout_seconds),
        );
        if let Some(max_tokens) = config.max_tokens {
            provider.max_tokens = max_tokens;
        }
        provider.temperature = config.temperature;
        Ok(provider)
    }

    async fn send(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = MessagesBody {
            model: &self.model,
            system: request.system_with_json_instruction(),
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let endpoint = format!("{}/v1/messages", self.base_url);
        let mut builder = self
            .client
            .post(&endpoint)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(&self.name, e))?;
        let text = read_http_body(&self.name, response).await?;

        let parsed: MessagesResponse = serde_json::from_str(&text).map_err(|e| {
            LlmError::provider_error(&self.name, format!("decode failed: {e} (body: {text})"))
        })?;
        let joined = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        if joined.trim().is_empty() {
            return Err(LlmError::provider_error(&self.name, "empty completion"));
        }
        Ok(joined)
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        debug!(provider = %self.name, model = %self.model, role = %request.role, "messages call");
        tokio::time::timeout(self.timeout, self.send(request))
            .await
            .map_err(|_| LlmError::Timeout {
                provider: self.name.clone(),
                seconds: self.timeout.as_secs(),
            })?
    }
}
