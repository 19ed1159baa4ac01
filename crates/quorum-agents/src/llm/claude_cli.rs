use std::time::Duration;

use async_trait::async_trait;
use quorum_models::ProviderConfig;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CompletionRequest, LlmProvider};
use crate::error::LlmError;

/// Runs completions through the local `claude` CLI.
///
/// The CLI has no JSON mode, so the JSON instruction is appended to the
/// system prompt. Multi-message conversations are flattened into one prompt.
#[derive(Debug, Clone)]
pub struct ClaudeCliProvider {
    name: String,
    model: String,
    timeout: Duration,
    binary: String,
}

impl ClaudeCliProvider {
    pub fn new(name: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            timeout,
            binary: "claude".to_string(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.model.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
    }

    /// Use a different executable, e.g. a wrapper script.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Check if the CLI is available on the system.
    pub async fn check_available(&self) -> bool {
        match Command::new(&self.binary).arg("--version").output().await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }
}

fn flatten_messages(request: &CompletionRequest) -> String {
    match request.messages.as_slice() {
        [only] => only.content.clone(),
        messages => messages
            .iter()
            .map(|m| format!("[{}]\n{}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

#[async_trait]
impl LlmProvider for ClaudeCliProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        debug!(provider = %self.name, model = %self.model, role = %request.role, "Invoking claude CLI");

        let system_prompt = request.system_with_json_instruction();
        let user_prompt = flatten_messages(request);

        let output = tokio::time::timeout(self.timeout, async {
            Command::new(&self.binary)
                .args([
                    "-p",
                    &user_prompt,
                    "--system-prompt",
                    &system_prompt,
                    "--model",
                    &self.model,
                    "--output-format",
                    "text",
                ])
                .kill_on_drop(true)
                .output()
                .await
        })
        .await
        .map_err(|_| LlmError::Timeout {
            provider: self.name.clone(),
            seconds: self.timeout.as_secs(),
        })?
        .map_err(|e| {
            LlmError::provider_error(&self.name, format!("failed to spawn {}: {e}", self.binary))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(provider = %self.name, status = %output.status, stderr = %stderr, "claude CLI failed");
            return Err(LlmError::Provider {
                provider: self.name.clone(),
                status: output.status.code().map(|c| c as u16),
                message: stderr.to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if stdout.trim().is_empty() {
            return Err(LlmError::provider_error(&self.name, "empty response"));
        }
        Ok(stdout)
    }
}
