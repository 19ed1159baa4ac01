use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use quorum_models::{AnalystKind, AnalystReport, MarketDataPackage, ReportStatus};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::error::AgentError;
use crate::llm::{CompletionRequest, LlmProvider};
use crate::outputs::{to_confidence, AnalystOutput};
use crate::prompts::analyst_system_prompt;
use crate::structured::request_structured;

/// Trait for analysts. Mockable for testing.
#[async_trait]
pub trait Analyst: Send + Sync {
    fn kind(&self) -> AnalystKind;

    async fn analyze(&self, package: &MarketDataPackage) -> Result<AnalystReport, AgentError>;
}

/// The slice of the package one analyst gets to see.
pub fn domain_view(kind: AnalystKind, package: &MarketDataPackage, candle_tail: usize) -> Value {
    let base = |extra: Value| {
        let mut view = json!({
            "symbol": package.symbol,
            "market_type": package.market_type,
        });
        if let (Some(map), Value::Object(extra)) = (view.as_object_mut(), extra) {
            map.extend(extra);
        }
        view
    };

    match kind {
        AnalystKind::Technical => {
            let candles: serde_json::Map<String, Value> = package
                .candles
                .keys()
                .map(|tf| (tf.clone(), json!(package.tail(tf, candle_tail))))
                .collect();
            base(json!({
                "last_price": package.last_price(),
                "candles": candles,
                "indicators": package.indicators,
            }))
        }
        AnalystKind::Sentiment => {
            let change_pct: serde_json::Map<String, Value> = package
                .candles
                .keys()
                .filter_map(|tf| package.change_pct(tf).map(|c| (tf.clone(), json!(c))))
                .collect();
            let headlines: Vec<Value> = package
                .news
                .iter()
                .map(|n| json!({"title": n.title, "source": n.source, "published_at": n.published_at}))
                .collect();
            base(json!({
                "funding_rate": package.funding_rate,
                "headlines": headlines,
                "change_pct": change_pct,
            }))
        }
        AnalystKind::Fundamental => base(json!({
            "last_price": package.last_price(),
            "fundamentals": package.fundamentals,
        })),
        AnalystKind::News => base(json!({ "news": package.news })),
    }
}

/// An analyst backed by an LLM provider.
pub struct LlmAnalyst {
    kind: AnalystKind,
    provider: Arc<dyn LlmProvider>,
    candle_tail: usize,
}

impl LlmAnalyst {
    pub fn new(kind: AnalystKind, provider: Arc<dyn LlmProvider>, candle_tail: usize) -> Self {
        Self {
            kind,
            provider,
            candle_tail,
        }
    }
}

#[async_trait]
impl Analyst for LlmAnalyst {
    fn kind(&self) -> AnalystKind {
        self.kind
    }

    async fn analyze(&self, package: &MarketDataPackage) -> Result<AnalystReport, AgentError> {
        let view = domain_view(self.kind, package, self.candle_tail);
        let request = CompletionRequest::json(
            format!("analyst:{}", self.kind),
            analyst_system_prompt(self.kind),
            serde_json::to_string_pretty(&view)?,
        );
        let output: AnalystOutput = request_structured(self.provider.as_ref(), &request).await?;

        Ok(AnalystReport {
            analyst: self.kind,
            model: Some(self.provider.name().to_string()),
            summary: output.summary,
            bullish_points: output.bullish_points,
            bearish_points: output.bearish_points,
            confidence: to_confidence(output.confidence),
            status: ReportStatus::Available,
            elapsed_ms: 0,
        })
    }
}

/// Runs every analyst concurrently over the same package.
pub struct AnalystTeam {
    analysts: Vec<Arc<dyn Analyst>>,
}

impl AnalystTeam {
    pub fn new(analysts: Vec<Arc<dyn Analyst>>) -> Self {
        Self { analysts }
    }

    /// One report per analyst, in configuration order. Failures become
    /// unavailable reports with zero confidence.
    pub async fn run(&self, package: Arc<MarketDataPackage>) -> Vec<AnalystReport> {
        let start = Instant::now();

        let mut handles = Vec::with_capacity(self.analysts.len());
        for analyst in &self.analysts {
            let analyst = Arc::clone(analyst);
            let package = Arc::clone(&package);
            let kind = analyst.kind();
            let handle = tokio::spawn(async move {
                let agent_start = Instant::now();
                let result = analyst.analyze(&package).await;
                (result, agent_start.elapsed())
            });
            handles.push((kind, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (kind, handle) in handles {
            let report = match handle.await {
                Ok((Ok(mut report), elapsed)) => {
                    report.elapsed_ms = elapsed.as_millis() as u64;
                    info!(analyst = %kind, confidence = %report.confidence, elapsed_ms = report.elapsed_ms, "Analyst succeeded");
                    report
                }
                Ok((Err(e), elapsed)) => {
                    warn!(analyst = %kind, error = %e, elapsed_ms = elapsed.as_millis() as u64, "Analyst failed");
                    AnalystReport::unavailable(kind, e.to_string(), elapsed.as_millis() as u64)
                }
                Err(e) => {
                    error!(analyst = %kind, error = %e, "Analyst task panicked");
                    AnalystReport::unavailable(
                        kind,
                        format!("task failed: {e}"),
                        start.elapsed().as_millis() as u64,
                    )
                }
            };
            reports.push(report);
        }

        let available = reports.iter().filter(|r| r.is_available()).count();
        info!(
            symbol = %package.symbol,
            available,
            total = reports.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Analyst team complete"
        );
        reports
    }
}
