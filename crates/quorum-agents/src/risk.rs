use chrono::Utc;
use quorum_models::{
    Adjustment, MarketDataPackage, MarketType, MarketsConfig, RiskAssessment, RiskLevel,
    RiskPolicy, TradeDecision, VetoReason,
};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::sizing::max_stop_distance;

/// Deterministic policy check on a trade decision.
///
/// A veto is an ordinary assessment with `passed == false`, never an error.
/// Looping back to the trader is the pipeline's job.
#[derive(Debug, Clone)]
pub struct RiskGate {
    policy: RiskPolicy,
    markets: MarketsConfig,
}

impl RiskGate {
    pub fn new(policy: RiskPolicy, markets: MarketsConfig) -> Self {
        Self { policy, markets }
    }

    /// Highest leverage allowed on a market.
    pub fn leverage_ceiling(&self, market: MarketType) -> u32 {
        self.policy
            .max_leverage
            .min(self.markets.params(market).max_leverage)
    }

    pub fn max_stop_distance(&self, leverage: Option<u32>) -> Decimal {
        max_stop_distance(&self.policy, leverage)
    }

    pub fn assess(&self, decision: &TradeDecision, package: &MarketDataPackage) -> RiskAssessment {
        let market = package.market_type;
        let mut veto_reasons = Vec::new();
        let mut adjustments = Vec::new();

        if !decision.is_hold() {
            let ceiling = self.leverage_ceiling(market);
            match (market, decision.leverage) {
                (MarketType::Futures, Some(leverage)) if leverage > 0 => {
                    if leverage > ceiling {
                        veto_reasons.push(VetoReason::LeverageTooHigh {
                            leverage,
                            max: ceiling,
                        });
                        adjustments.push(Adjustment::CapLeverage { max: ceiling });
                    }
                }
                (MarketType::Spot, None) => {}
                (_, leverage) => {
                    veto_reasons.push(VetoReason::LeverageMarketMismatch { market, leverage });
                    adjustments.push(Adjustment::SetLeverage {
                        leverage: market.is_futures().then_some(1),
                    });
                }
            }

            let max_stop = self.max_stop_distance(decision.leverage.filter(|_| market.is_futures()));
            match decision.stop_distance_pct() {
                None => {
                    veto_reasons.push(VetoReason::MissingStop);
                    adjustments.push(Adjustment::AddStop {
                        distance_pct: (self.policy.min_stop_distance_pct * Decimal::TWO).min(max_stop),
                    });
                }
                Some(distance) if distance < self.policy.min_stop_distance_pct => {
                    veto_reasons.push(VetoReason::StopTooTight {
                        distance_pct: distance,
                        min_pct: self.policy.min_stop_distance_pct,
                    });
                    adjustments.push(Adjustment::WidenStop {
                        min_pct: self.policy.min_stop_distance_pct,
                    });
                }
                Some(distance) if distance > max_stop => {
                    veto_reasons.push(VetoReason::StopBeyondLiquidation {
                        distance_pct: distance,
                        max_pct: max_stop,
                    });
                    adjustments.push(Adjustment::TightenStop { max_pct: max_stop });
                }
                Some(_) => {}
            }

            if decision.margin_usd > self.policy.max_investment_usd {
                veto_reasons.push(VetoReason::PositionTooLarge {
                    margin_usd: decision.margin_usd,
                    max_usd: self.policy.max_investment_usd,
                });
                adjustments.push(Adjustment::CapMargin {
                    max_usd: self.policy.max_investment_usd,
                });
            } else if decision.margin_usd < self.policy.min_investment_usd {
                veto_reasons.push(VetoReason::PositionTooSmall {
                    margin_usd: decision.margin_usd,
                    min_usd: self.policy.min_investment_usd,
                });
                adjustments.push(Adjustment::RaiseMargin {
                    min_usd: self.policy.min_investment_usd,
                });
            }
        }

        let passed = veto_reasons.is_empty();
        let risk_level = if passed {
            risk_level(decision)
        } else {
            RiskLevel::High
        };

        if passed {
            info!(version = decision.version, ?risk_level, "Risk gate passed");
        } else {
            let reasons: Vec<String> = veto_reasons.iter().map(ToString::to_string).collect();
            warn!(version = decision.version, reasons = ?reasons, "Risk gate vetoed");
        }

        RiskAssessment {
            decision_version: decision.version,
            risk_level,
            passed,
            veto_reasons,
            adjustments,
            assessed_at: Utc::now(),
        }
    }
}

/// Exposure from leverage and stop width.
fn risk_level(decision: &TradeDecision) -> RiskLevel {
    if decision.is_hold() {
        return RiskLevel::Low;
    }
    let leverage = decision.leverage.unwrap_or(1);
    let stop = decision.stop_distance_pct().unwrap_or(Decimal::ZERO);
    if leverage >= 10 || stop > Decimal::new(5, 2) {
        RiskLevel::High
    } else if leverage >= 5 || stop > Decimal::new(2, 2) {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}
