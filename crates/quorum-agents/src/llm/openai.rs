use std::time::Duration;

use async_trait::async_trait;
use quorum_models::ProviderConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{api_key_from_env, read_http_body, transport_error, CompletionRequest, LlmProvider, ResponseFormat};
use crate::error::LlmError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Any endpoint speaking the `/chat/completions` dialect: OpenAI, DeepSeek,
/// OpenRouter, Qwen and friends. JSON requests use the native
/// `response_format: json_object` switch.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    name: String,
    model: String,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleProvider {
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
            max_tokens: None,
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
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            api_key_from_env(config)?,
            Duration::from_secs(config.timeout_seconds),
        );
        provider.max_tokens = config.max_tokens;
        provider.temperature = config.temperature;
        Ok(provider)
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> ChatCompletionBody<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(WireMessage {
            role: "system",
            content: &request.system,
        });
        messages.extend(request.messages.iter().map(|m| WireMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));
        ChatCompletionBody {
            model: &self.model,
            messages,
            response_format: match request.response_format {
                ResponseFormat::Json => Some(WireResponseFormat { kind: "json_object" }),
                ResponseFormat::Text => None,
            },
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    async fn send(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let endpoint = format!("{}/chat/completions", self.base_url);
        let mut builder = self.client.post(&endpoint).json(&self.body(request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(&self.name, e))?;
        let body = read_http_body(&self.name, response).await?;

        let parsed: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::provider_error(&self.name, format!("decode failed: {e} (body: {body})"))
        })?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::provider_error(&self.name, "empty completion"))
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        debug!(provider = %self.name, model = %self.model, role = %request.role, "chat completion");
        tokio::time::timeout(self.timeout, self.send(request))
            .await
            .map_err(|_| LlmError::Timeout {
                provider: self.name.clone(),
                seconds: self.timeout.as_secs(),
            })?
    }
}
