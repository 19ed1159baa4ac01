//! Shapes the models are asked to reply with.
//!
//! Everything here is loose: numbers may arrive as strings,
//! enums as free text, lists may be missing. Conversion into the strict
//! domain types happens in the nodes.

use quorum_models::{
    AnalystKind, ClaimPolarity, ClaimRef, Direction, LeverageTier, SizeTier, StopWidth,
    TradeAction, Volatility,
};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::parser::{ExpectedSchema, Structured};

/// Accept `0.7`, `"0.7"`, or `"70%"`.
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .trim_end_matches('%')
            .trim()
            .parse::<f64>()
            .map_err(serde::de::Error::custom),
    }
}

/// Clamp a model-reported confidence into [0, 1]. Values on a 0-100 scale
/// are rescaled.
pub fn to_confidence(value: f64) -> Decimal {
    if !value.is_finite() {
        return Decimal::new(5, 1);
    }
    let scaled = if value > 1.0 && value <= 100.0 {
        value / 100.0
    } else {
        value
    };
    Decimal::from_f64(scaled.clamp(0.0, 1.0))
        .map(|d| d.round_dp(4))
        .unwrap_or(Decimal::new(5, 1))
}

fn normalized(text: &str) -> String {
    text.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalystOutput {
    pub summary: String,
    #[serde(default)]
    pub bullish_points: Vec<String>,
    #[serde(default)]
    pub bearish_points: Vec<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub confidence: f64,
}

impl Structured for AnalystOutput {
    const SCHEMA: ExpectedSchema = ExpectedSchema {
        name: "analyst_report",
        required: &["summary", "confidence"],
    };
}

/// A claim reference as the model writes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimRefOutput {
    pub analyst: String,
    pub polarity: String,
    pub index: usize,
}

impl ClaimRefOutput {
    /// `None` when the analyst or polarity is not recognised.
    pub fn to_claim_ref(&self) -> Option<ClaimRef> {
        let analyst = match normalized(&self.analyst).trim_end_matches("_analyst") {
            "technical" => AnalystKind::Technical,
            "sentiment" => AnalystKind::Sentiment,
            "fundamental" => AnalystKind::Fundamental,
            "news" => AnalystKind::News,
            _ => return None,
        };
        let polarity = match normalized(&self.polarity).as_str() {
            "bullish" | "bull" => ClaimPolarity::Bullish,
            "bearish" | "bear" => ClaimPolarity::Bearish,
            _ => return None,
        };
        Some(ClaimRef {
            analyst,
            polarity,
            index: self.index,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchOutput {
    pub stance: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub confidence: f64,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub claim_refs: Vec<ClaimRefOutput>,
}

impl Structured for ResearchOutput {
    const SCHEMA: ExpectedSchema = ExpectedSchema {
        name: "research_turn",
        required: &["stance", "confidence"],
    };
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlagOutput {
    pub turn_index: usize,
    pub claim: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FactCheckOutput {
    pub flagged: Vec<FlagOutput>,
    #[serde(default)]
    pub summary: String,
}

impl Structured for FactCheckOutput {
    const SCHEMA: ExpectedSchema = ExpectedSchema {
        name: "fact_check",
        required: &["flagged"],
    };
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JudgeOutput {
    pub direction: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub confidence: f64,
    pub rationale: String,
    #[serde(default)]
    pub cited_turns: Vec<usize>,
    #[serde(default)]
    pub volatility: Option<String>,
}

impl Structured for JudgeOutput {
    const SCHEMA: ExpectedSchema = ExpectedSchema {
        name: "judge_stance",
        required: &["direction", "confidence", "rationale"],
    };
}

impl JudgeOutput {
    /// Unknown directions are read as neutral.
    pub fn direction(&self) -> Direction {
        match normalized(&self.direction).as_str() {
            "bullish" | "bull" | "long" | "buy" => Direction::Bullish,
            "bearish" | "bear" | "short" | "sell" => Direction::Bearish,
            _ => Direction::Neutral,
        }
    }

    pub fn volatility(&self) -> Volatility {
        match self.volatility.as_deref().map(normalized).as_deref() {
            Some("low") => Volatility::Low,
            Some("high") => Volatility::High,
            _ => Volatility::Medium,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraderOutput {
    pub action: String,
    #[serde(default)]
    pub size_tier: Option<String>,
    #[serde(default)]
    pub leverage_tier: Option<String>,
    #[serde(default)]
    pub stop_width: Option<String>,
    pub rationale: String,
}

impl Structured for TraderOutput {
    const SCHEMA: ExpectedSchema = ExpectedSchema {
        name: "trade_plan",
        required: &["action", "rationale"],
    };
}

impl TraderOutput {
    /// Unknown actions are read as hold.
    pub fn action(&self) -> TradeAction {
        match normalized(&self.action).as_str() {
            "buy" => TradeAction::Buy,
            "sell" => TradeAction::Sell,
            "long" | "open_long" => TradeAction::Long,
            "short" | "open_short" => TradeAction::Short,
            _ => TradeAction::Hold,
        }
    }

    pub fn size_tier(&self) -> SizeTier {
        match self.size_tier.as_deref().map(normalized).as_deref() {
            Some("conservative" | "small" | "low") => SizeTier::Conservative,
            Some("aggressive" | "large" | "high") => SizeTier::Aggressive,
            _ => SizeTier::Moderate,
        }
    }

    pub fn leverage_tier(&self) -> LeverageTier {
        match self.leverage_tier.as_deref().map(normalized).as_deref() {
            Some("medium" | "moderate") => LeverageTier::Medium,
            Some("high" | "aggressive") => LeverageTier::High,
            _ => LeverageTier::Low,
        }
    }

    pub fn stop_width(&self) -> StopWidth {
        match self.stop_width.as_deref().map(normalized).as_deref() {
            Some("tight" | "narrow") => StopWidth::Tight,
            Some("wide" | "loose") => StopWidth::Wide,
            _ => StopWidth::Normal,
        }
    }
}
