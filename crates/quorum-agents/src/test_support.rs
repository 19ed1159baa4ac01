//! Scripted providers and fixtures for exercising the pipeline without a
//! live model.
//!
//! `ScriptedProvider` routes each request by its role (`analyst:technical`,
//! `researcher:bull`, `judge`, `trader`, ...) to a closure that receives the
//! zero-based call count for that role, so tests can script "fail twice,
//! then succeed" sequences.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use quorum_models::{
    AnalystKind, AnalystReport, Candle, Direction, JudgeStance, MarketDataPackage, MarketType,
    NewsItem, PipelineConfig, ReportStatus, RetryConfig, TradeAction, TradeChoices,
    TradeDecision, Volatility, PACKAGE_SCHEMA_VERSION,
};
use rust_decimal::Decimal;
use serde_json::json;

use crate::error::LlmError;
use crate::llm::{CompletionRequest, LlmProvider};

type Script = Box<dyn Fn(u32) -> Result<String, LlmError> + Send + Sync>;

/// A provider whose replies are scripted per request role.
pub struct ScriptedProvider {
    name: String,
    model: String,
    routes: Vec<(String, Script)>,
    fallback: Option<Script>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            model: format!("{name}-scripted"),
            routes: Vec::new(),
            fallback: None,
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Answer requests whose role starts with `prefix`. Earlier routes win.
    pub fn route<F>(mut self, prefix: &str, script: F) -> Self
    where
        F: Fn(u32) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        self.routes.push((prefix.to_string(), Box::new(script)));
        self
    }

    /// Answer anything no route matched.
    pub fn fallback<F>(mut self, script: F) -> Self
    where
        F: Fn(u32) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(script));
        self
    }

    /// Well-formed replies for every pipeline role, added after any
    /// routes already registered so those take precedence.
    pub fn with_pipeline_defaults(self) -> Self {
        self.route("analyst:", |_| Ok(analyst_json(0.7)))
            .route("researcher:bull", |_| Ok(research_json("Trend and flows favour upside", 0.7)))
            .route("researcher:bear", |_| Ok(research_json("Funding is stretched", 0.5)))
            .route("researcher:neutral", |_| Ok(research_json("Bulls have the edge", 0.6)))
            .route("fact_checker", |_| {
                Ok(json!({"flagged": [], "summary": "no issues"}).to_string())
            })
            .route("judge", |_| Ok(judge_json("bullish", 0.7, &[0, 1])))
            .route("trader", |_| Ok(trader_json("long", "moderate", "low", "normal")))
    }

    /// Calls received for exactly this role.
    pub fn calls(&self, role: &str) -> u32 {
        self.counts().get(role).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.counts().values().sum()
    }

    fn counts(&self) -> std::sync::MutexGuard<'_, HashMap<String, u32>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let call = {
            let mut counts = self.counts();
            let count = counts.entry(request.role.clone()).or_insert(0);
            let call = *count;
            *count += 1;
            call
        };

        let script = self
            .routes
            .iter()
            .find(|(prefix, _)| request.role.starts_with(prefix.as_str()))
            .map(|(_, script)| script)
            .or(self.fallback.as_ref());

        match script {
            Some(script) => script(call),
            None => Err(LlmError::provider_error(
                &self.name,
                format!("no script for role '{}'", request.role),
            )),
        }
    }
}

pub fn analyst_json(confidence: f64) -> String {
    json!({
        "summary": "Price is holding above the 20-period average",
        "bullish_points": ["Higher lows on the 1h chart", "Volume rising into resistance"],
        "bearish_points": ["RSI near overbought"],
        "confidence": confidence,
    })
    .to_string()
}

pub fn research_json(stance: &str, confidence: f64) -> String {
    json!({
        "stance": stance,
        "confidence": confidence,
        "key_points": ["point one", "point two"],
        "claim_refs": [{"analyst": "technical", "polarity": "bullish", "index": 0}],
    })
    .to_string()
}

pub fn judge_json(direction: &str, confidence: f64, cited_turns: &[usize]) -> String {
    json!({
        "direction": direction,
        "confidence": confidence,
        "rationale": format!("The {direction} case is better supported"),
        "cited_turns": cited_turns,
        "volatility": "medium",
    })
    .to_string()
}

pub fn trader_json(action: &str, size_tier: &str, leverage_tier: &str, stop_width: &str) -> String {
    json!({
        "action": action,
        "size_tier": size_tier,
        "leverage_tier": leverage_tier,
        "stop_width": stop_width,
        "rationale": format!("{action} with {leverage_tier} leverage"),
    })
    .to_string()
}

/// Pipeline defaults pointed at a provider named `gpt`, with no retry waits.
pub fn test_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        default_provider: "gpt".to_string(),
        retry: RetryConfig {
            base_delay_ms: 0,
            factor: 1,
            max_attempts: 3,
        },
        ..PipelineConfig::default()
    }
}

/// BTCUSDT drifting up to 50000 over the last day.
pub fn sample_package(market_type: MarketType) -> MarketDataPackage {
    let now = Utc::now();
    let hourly: Vec<Candle> = (0..24i64)
        .map(|i| {
            let close = Decimal::from(50000 - (23 - i) * 50);
            Candle {
                open_time: now - Duration::hours(24 - i),
                open: close - Decimal::from(20),
                high: close + Decimal::from(40),
                low: close - Decimal::from(60),
                close,
                volume: Decimal::from(100 + i),
            }
        })
        .collect();
    let four_hourly: Vec<Candle> = hourly
        .chunks(4)
        .map(|chunk| Candle {
            open_time: chunk[0].open_time,
            open: chunk[0].open,
            high: chunk.iter().map(|c| c.high).max().unwrap_or_default(),
            low: chunk.iter().map(|c| c.low).min().unwrap_or_default(),
            close: chunk[chunk.len() - 1].close,
            volume: chunk.iter().map(|c| c.volume).sum(),
        })
        .collect();

    let mut candles = BTreeMap::new();
    candles.insert("1h".to_string(), hourly);
    candles.insert("4h".to_string(), four_hourly);

    let mut indicators = BTreeMap::new();
    indicators.insert("rsi_14".to_string(), json!(64.2));
    indicators.insert("ema_20".to_string(), json!(49620.5));

    MarketDataPackage {
        schema_version: PACKAGE_SCHEMA_VERSION,
        symbol: "BTCUSDT".to_string(),
        market_type,
        captured_at: now,
        candles,
        indicators,
        news: vec![
            NewsItem {
                title: "Spot ETF inflows extend to a fifth day".to_string(),
                source: "coindesk".to_string(),
                published_at: now - Duration::hours(3),
                summary: None,
            },
            NewsItem {
                title: "Exchange reserves fall to multi-year low".to_string(),
                source: "theblock".to_string(),
                published_at: now - Duration::hours(9),
                summary: Some("On-chain data shows coins leaving exchanges".to_string()),
            },
        ],
        funding_rate: Some(Decimal::new(1, 4)),
        fundamentals: Some(json!({"market_cap_rank": 1, "circulating_supply": 19800000})),
        last_price: Some(Decimal::from(50000)),
    }
}

/// One available report per analyst kind.
pub fn sample_reports() -> Vec<AnalystReport> {
    AnalystKind::ALL
        .iter()
        .map(|&kind| AnalystReport {
            analyst: kind,
            model: Some("gpt".to_string()),
            summary: format!("{kind} view is constructive"),
            bullish_points: vec![
                format!("{kind}: higher lows"),
                format!("{kind}: improving flows"),
            ],
            bearish_points: vec![format!("{kind}: stretched funding")],
            confidence: Decimal::new(65, 2),
            status: ReportStatus::Available,
            elapsed_ms: 10,
        })
        .collect()
}

pub fn sample_judge(direction: Direction, confidence: Decimal) -> JudgeStance {
    JudgeStance {
        direction,
        confidence,
        rationale: "Bull case cites more verified evidence".to_string(),
        cited_turns: vec![0, 1],
        volatility: Volatility::Medium,
        degraded: false,
    }
}

/// Version 0 decision at 50000 with the given stop distance and margin.
pub fn sample_decision(
    action: TradeAction,
    leverage: Option<u32>,
    stop_distance_pct: Decimal,
    margin_usd: Decimal,
) -> TradeDecision {
    let entry = Decimal::from(50000);
    let stop_move = entry * stop_distance_pct;
    let (stop_loss, take_profit) = if action.is_short_side() {
        (entry + stop_move, entry - stop_move * Decimal::TWO)
    } else {
        (entry - stop_move, entry + stop_move * Decimal::TWO)
    };
    let contract_value_usd = margin_usd * Decimal::from(leverage.unwrap_or(1));
    TradeDecision {
        version: 0,
        action,
        entry_price: entry,
        stop_loss: Some(stop_loss),
        take_profit: Some(take_profit),
        position_fraction: (margin_usd / Decimal::from(1000)).round_dp(6),
        margin_usd,
        contract_value_usd,
        quantity: (contract_value_usd / entry).round_dp(8),
        leverage,
        choices: TradeChoices::default(),
        rationale: "fixture".to_string(),
        addressed_vetoes: vec![],
        degraded: false,
        created_at: Utc::now(),
    }
}
