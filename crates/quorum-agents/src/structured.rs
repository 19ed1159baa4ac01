use tracing::warn;

use crate::error::AgentError;
use crate::llm::{CompletionRequest, LlmProvider};
use crate::parser::{parse_structured, Structured};

/// Call the provider and parse its reply into `T`.
///
/// Transport retries are the provider's business (see `RetryingClient`).
/// A reply that fails to parse earns exactly one more call.
pub async fn request_structured<T: Structured>(
    provider: &dyn LlmProvider,
    request: &CompletionRequest,
) -> Result<T, AgentError> {
    let raw = provider.complete(request).await?;
    match parse_structured::<T>(&raw) {
        Ok(parsed) => Ok(parsed),
        Err(first) => {
            warn!(
                provider = %provider.name(),
                role = %request.role,
                schema = first.schema,
                error = %first.message,
                "Unparseable reply, asking again"
            );
            let raw = provider.complete(request).await?;
            Ok(parse_structured::<T>(&raw)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outputs::JudgeOutput;
    use crate::test_support::ScriptedProvider;

    const JUDGE_JSON: &str = r#"{"direction": "bullish", "confidence": 0.7, "rationale": "r", "cited_turns": [0], "volatility": "low"}"#;

    #[tokio::test]
    async fn second_call_after_parse_failure() {
        let provider = ScriptedProvider::new("gpt").route("judge", |call| {
            if call == 0 {
                Ok("I think the market is bullish.".to_string())
            } else {
                Ok(JUDGE_JSON.to_string())
            }
        });
        let request = CompletionRequest::json("judge", "sys", "{}");
        let out: JudgeOutput = request_structured(&provider, &request).await.unwrap();
        assert_eq!(out.direction, "bullish");
        assert_eq!(provider.calls("judge"), 2);
    }

    #[tokio::test]
    async fn two_parse_failures_surface_parse_error() {
        let provider = ScriptedProvider::new("gpt").route("judge", |_| Ok("nope".to_string()));
        let request = CompletionRequest::json("judge", "sys", "{}");
        let err = request_structured::<JudgeOutput>(&provider, &request)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Parse(_)));
        assert_eq!(provider.calls("judge"), 2);
    }
}
