use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market::MarketType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Buy,
    Sell,
    Long,
    Short,
    Hold,
}

impl TradeAction {
    /// Profits when price rises.
    pub fn is_long_side(self) -> bool {
        matches!(self, TradeAction::Buy | TradeAction::Long)
    }

    pub fn is_short_side(self) -> bool {
        matches!(self, TradeAction::Sell | TradeAction::Short)
    }

    /// Map the action onto the verbs valid for a market: spot trades buy/sell,
    /// futures trades long/short.
    pub fn for_market(self, market: MarketType) -> TradeAction {
        match (market, self) {
            (_, TradeAction::Hold) => TradeAction::Hold,
            (MarketType::Spot, a) if a.is_long_side() => TradeAction::Buy,
            (MarketType::Spot, _) => TradeAction::Sell,
            (MarketType::Futures, a) if a.is_long_side() => TradeAction::Long,
            (MarketType::Futures, _) => TradeAction::Short,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SizeTier {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeverageTier {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum StopWidth {
    Tight,
    #[default]
    Normal,
    Wide,
}

/// The qualitative selections the trader model made. Numbers are derived
/// from these in code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TradeChoices {
    pub size_tier: SizeTier,
    pub leverage_tier: LeverageTier,
    pub stop_width: StopWidth,
}

/// A concrete trade proposal. Each re-plan produces a new version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeDecision {
    /// Equals the workflow's replan count when the decision was made.
    pub version: u32,
    pub action: TradeAction,
    pub entry_price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    /// Margin as a fraction of account equity.
    pub position_fraction: Decimal,
    pub margin_usd: Decimal,
    /// Notional after fees and leverage.
    pub contract_value_usd: Decimal,
    /// Base-asset units, or contracts for futures.
    pub quantity: Decimal,
    /// Present iff the market is futures.
    pub leverage: Option<u32>,
    pub choices: TradeChoices,
    pub rationale: String,
    /// Veto reasons from the previous version that this one answers.
    pub addressed_vetoes: Vec<VetoReason>,
    pub degraded: bool,
    pub created_at: DateTime<Utc>,
}

impl TradeDecision {
    pub fn is_hold(&self) -> bool {
        self.action == TradeAction::Hold
    }

    /// Distance from entry to stop as a fraction of entry.
    pub fn stop_distance_pct(&self) -> Option<Decimal> {
        let stop = self.stop_loss?;
        if self.entry_price.is_zero() {
            return None;
        }
        Some(((self.entry_price - stop).abs() / self.entry_price).round_dp(6))
    }

    /// Same version flattened to a hold. Leverage is kept so the market
    /// invariant still holds.
    pub fn to_hold(&self, rationale: impl Into<String>) -> TradeDecision {
        TradeDecision {
            action: TradeAction::Hold,
            stop_loss: None,
            take_profit: None,
            position_fraction: Decimal::ZERO,
            margin_usd: Decimal::ZERO,
            contract_value_usd: Decimal::ZERO,
            quantity: Decimal::ZERO,
            rationale: rationale.into(),
            created_at: Utc::now(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Why the risk gate refused a decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VetoReason {
    LeverageTooHigh { leverage: u32, max: u32 },
    LeverageMarketMismatch { market: MarketType, leverage: Option<u32> },
    MissingStop,
    StopTooTight { distance_pct: Decimal, min_pct: Decimal },
    StopBeyondLiquidation { distance_pct: Decimal, max_pct: Decimal },
    PositionTooLarge { margin_usd: Decimal, max_usd: Decimal },
    PositionTooSmall { margin_usd: Decimal, min_usd: Decimal },
}

impl std::fmt::Display for VetoReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VetoReason::LeverageTooHigh { leverage, max } => {
                write!(f, "leverage too high: {leverage}x exceeds {max}x")
            }
            VetoReason::LeverageMarketMismatch { market, leverage } => {
                write!(f, "leverage {leverage:?} not valid for {market} market")
            }
            VetoReason::MissingStop => write!(f, "no stop-loss set"),
            VetoReason::StopTooTight {
                distance_pct,
                min_pct,
            } => write!(f, "stop too tight: {distance_pct} below minimum {min_pct}"),
            VetoReason::StopBeyondLiquidation {
                distance_pct,
                max_pct,
            } => write!(
                f,
                "stop beyond liquidation margin: {distance_pct} exceeds {max_pct}"
            ),
            VetoReason::PositionTooLarge { margin_usd, max_usd } => {
                write!(f, "position too large: {margin_usd} USD above {max_usd} USD")
            }
            VetoReason::PositionTooSmall { margin_usd, min_usd } => {
                write!(f, "position too small: {margin_usd} USD below {min_usd} USD")
            }
        }
    }
}

/// Concrete change the gate suggests alongside a veto.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Adjustment {
    CapLeverage { max: u32 },
    SetLeverage { leverage: Option<u32> },
    AddStop { distance_pct: Decimal },
    WidenStop { min_pct: Decimal },
    TightenStop { max_pct: Decimal },
    CapMargin { max_usd: Decimal },
    RaiseMargin { min_usd: Decimal },
}

/// The gate's verdict on one decision version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskAssessment {
    pub decision_version: u32,
    pub risk_level: RiskLevel,
    pub passed: bool,
    pub veto_reasons: Vec<VetoReason>,
    pub adjustments: Vec<Adjustment>,
    pub assessed_at: DateTime<Utc>,
}

impl RiskAssessment {
    pub fn vetoed(&self) -> bool {
        !self.passed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum OverrideReason {
    /// The replan budget ran out with the gate still vetoing.
    RiskUnresolved,
    /// The judge's conviction was below the fund manager's floor.
    LowConviction { confidence: Decimal, min: Decimal },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApprovalStatus {
    Approved,
    OverriddenToHold { cause: OverrideReason },
}

/// Terminal record of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalApproval {
    pub status: ApprovalStatus,
    /// What the caller should act on. A hold when overridden.
    pub decision: TradeDecision,
    pub risk_unresolved: bool,
    pub notes: Vec<String>,
    pub decided_at: DateTime<Utc>,
}

impl FinalApproval {
    pub fn is_approved(&self) -> bool {
        matches!(self.status, ApprovalStatus::Approved)
    }
}
