//! Vendor-neutral LLM access.
//!
//! Every role talks to an `Arc<dyn LlmProvider>`. Vendor quirks (JSON mode,
//! auth headers, response envelopes) stay inside the provider wrappers.

pub mod anthropic;
pub mod claude_cli;
pub mod openai;
pub mod retry;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quorum_models::{ProviderConfig, ProviderKind};
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

pub use anthropic::AnthropicProvider;
pub use claude_cli::ClaudeCliProvider;
pub use openai::OpenAiCompatibleProvider;
pub use retry::{RetryPolicy, RetryingClient};

/// Appended to the system prompt for providers without a native JSON mode.
pub const JSON_INSTRUCTION: &str = "Respond with a single valid JSON object and nothing else. \
Do not wrap it in markdown code fences and do not add commentary before or after it.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// One call to a model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Pipeline role issuing the call, e.g. `analyst:technical` or `judge`.
    pub role: String,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub response_format: ResponseFormat,
}

impl CompletionRequest {
    pub fn json(role: impl Into<String>, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            system: system.into(),
            messages: vec![ChatMessage::user(user)],
            response_format: ResponseFormat::Json,
        }
    }

    /// System prompt with the JSON instruction appended when JSON was asked for.
    pub fn system_with_json_instruction(&self) -> String {
        match self.response_format {
            ResponseFormat::Json => format!("{}\n\n{}", self.system, JSON_INSTRUCTION),
            ResponseFormat::Text => self.system.clone(),
        }
    }
}

/// Trait for LLM vendors. Mockable for testing.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Configured provider name.
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    /// Return the raw text of the model's reply.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

/// Named providers, shared read-only across runs.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one provider per config entry. API keys come from the environment.
    pub fn from_configs(configs: &[ProviderConfig]) -> Result<Self, LlmError> {
        let mut registry = Self::new();
        for config in configs {
            let provider: Arc<dyn LlmProvider> = match config.kind {
                ProviderKind::OpenAi => Arc::new(OpenAiCompatibleProvider::from_config(config)?),
                ProviderKind::Anthropic => Arc::new(AnthropicProvider::from_config(config)?),
                ProviderKind::ClaudeCli => Arc::new(ClaudeCliProvider::from_config(config)),
            };
            registry.insert(provider);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn LlmProvider>, LlmError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| LlmError::UnknownProvider(name.to_string()))
    }

    /// Look up a provider and wrap it with the retry policy.
    pub fn retrying(
        &self,
        name: &str,
        policy: &RetryPolicy,
    ) -> Result<Arc<dyn LlmProvider>, LlmError> {
        let inner = self.get(name)?;
        Ok(Arc::new(RetryingClient::new(inner, policy.clone())))
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Read the API key named by the config from the environment.
pub(crate) fn api_key_from_env(config: &ProviderConfig) -> Result<Option<String>, LlmError> {
    match &config.api_key_env {
        None => Ok(None),
        Some(var) => std::env::var(var).map(Some).map_err(|_| {
            LlmError::Config(format!(
                "provider '{}' expects an API key in ${var}",
                config.name
            ))
        }),
    }
}

/// Turn an HTTP response into its body, classifying failures.
pub(crate) async fn read_http_body(
    provider: &str,
    response: reqwest::Response,
) -> Result<String, LlmError> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after,
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| transport_error(provider, e))?;
    if !status.is_success() {
        return Err(LlmError::Provider {
            provider: provider.to_string(),
            status: Some(status.as_u16()),
            message: body,
        });
    }
    Ok(body)
}

pub(crate) fn transport_error(provider: &str, error: reqwest::Error) -> LlmError {
    LlmError::provider_error(provider, format!("transport: {error}"))
}
