use std::time::Duration;

use quorum_models::{ConfigError, DebateLogError, WorkflowStateError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("{provider} timed out after {seconds} seconds")]
    Timeout { provider: String, seconds: u64 },

    #[error("{provider} rate limited (retry after {retry_after:?})")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("{provider} error (status {status:?}): {message}")]
    Provider {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error("{provider} unavailable after {attempts} attempts: {last}")]
    Unavailable {
        provider: String,
        attempts: u32,
        last: String,
    },

    #[error("Provider configuration error: {0}")]
    Config(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

impl LlmError {
    /// Transient failures the retry loop may try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Timeout { .. } | LlmError::RateLimited { .. } | LlmError::Provider { .. }
        )
    }

    pub fn provider_error(provider: &str, message: impl Into<String>) -> Self {
        LlmError::Provider {
            provider: provider.to_string(),
            status: None,
            message: message.into(),
        }
    }
}

/// Model output that could not be turned into the expected shape.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{schema}: {message}")]
pub struct ParseError {
    pub schema: &'static str,
    pub message: String,
    /// The untouched model output.
    pub raw: String,
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Agent response parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Failures that end a run as `run_failed`.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("no trade decision to approve")]
    MissingDecision,

    #[error("no risk assessment for decision version {0}")]
    MissingAssessment(u32),

    #[error("workflow state: {0}")]
    State(#[from] WorkflowStateError),

    #[error("debate log: {0}")]
    Debate(#[from] DebateLogError),
}
