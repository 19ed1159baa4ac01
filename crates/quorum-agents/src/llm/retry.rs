use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quorum_models::RetryConfig;
use tracing::warn;

use super::{CompletionRequest, LlmProvider};
use crate::error::LlmError;

/// Exponential backoff: `base * factor^(attempt - 1)` between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub factor: u32,
    pub max_attempts: u32,
    /// Upper bound for any single wait, including server `retry-after` hints.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            factor: config.factor.max(1),
            max_attempts: config.max_attempts.max(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            base_delay: Duration::ZERO,
            factor: 1,
            max_attempts: max_attempts.max(1),
            max_delay: Duration::ZERO,
        }
    }

    /// Wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32, error: &LlmError) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let backoff = self
            .base_delay
            .saturating_mul(self.factor.saturating_pow(exponent));
        let delay = match error {
            LlmError::RateLimited {
                retry_after: Some(hint),
                ..
            } if *hint > backoff => *hint,
            _ => backoff,
        };
        delay.min(self.max_delay)
    }
}

/// Wraps a provider so transient failures are retried before surfacing
/// [`LlmError::Unavailable`].
pub struct RetryingClient {
    inner: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn LlmProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl LlmProvider for RetryingClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match self.inner.complete(request).await {
                Ok(text) => return Ok(text),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if attempt >= self.policy.max_attempts {
                warn!(
                    provider = %self.inner.name(),
                    role = %request.role,
                    attempts = attempt,
                    error = %error,
                    "Retries exhausted"
                );
                return Err(LlmError::Unavailable {
                    provider: self.inner.name().to_string(),
                    attempts: attempt,
                    last: error.to_string(),
                });
            }

            let delay = self.policy.delay_for(attempt, &error);
            warn!(
                provider = %self.inner.name(),
                role = %request.role,
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying LLM call"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
