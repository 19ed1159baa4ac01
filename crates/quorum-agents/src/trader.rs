use std::sync::Arc;

use chrono::Utc;
use quorum_models::{
    AnalystReport, JudgeStance, MarketDataPackage, MarketType, MarketsConfig, RiskAssessment,
    RiskPolicy, TradeAction, TradeChoices, TradeDecision, TraderConfig, VetoReason,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::AgentError;
use crate::llm::{CompletionRequest, LlmProvider};
use crate::outputs::TraderOutput;
use crate::prompts::trader_system_prompt;
use crate::sizing::{levels, margin_for, max_stop_distance, size_position, stop_distance};
use crate::structured::request_structured;

/// Everything the trader looks at for one decision version.
#[derive(Debug, Clone, Copy)]
pub struct TradeContext<'a> {
    pub version: u32,
    pub judge: &'a JudgeStance,
    pub reports: &'a [AnalystReport],
    pub package: &'a MarketDataPackage,
    /// The vetoed decision being revised, if any.
    pub previous: Option<&'a TradeDecision>,
    pub feedback: Option<&'a RiskAssessment>,
}

/// What the trader model chose, before any arithmetic.
#[derive(Debug, Clone, PartialEq)]
pub struct TradePlan {
    pub action: TradeAction,
    pub choices: TradeChoices,
    pub rationale: String,
    pub degraded: bool,
}

impl TradePlan {
    pub fn from_output(output: &TraderOutput, market: MarketType) -> Self {
        Self {
            action: output.action().for_market(market),
            choices: TradeChoices {
                size_tier: output.size_tier(),
                leverage_tier: output.leverage_tier(),
                stop_width: output.stop_width(),
            },
            rationale: output.rationale.clone(),
            degraded: false,
        }
    }

    pub fn hold(rationale: impl Into<String>, degraded: bool) -> Self {
        Self {
            action: TradeAction::Hold,
            choices: TradeChoices::default(),
            rationale: rationale.into(),
            degraded,
        }
    }
}

/// Turns the judge's stance into a concrete, sized trade decision.
///
/// The model only picks an action and qualitative tiers; leverage, stop,
/// target and size are computed here. On a replan the gate's veto reasons
/// are applied to the computed numbers so the revision answers every one.
pub struct TraderNode {
    provider: Arc<dyn LlmProvider>,
    config: TraderConfig,
    policy: RiskPolicy,
    markets: MarketsConfig,
}

impl TraderNode {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: TraderConfig,
        policy: RiskPolicy,
        markets: MarketsConfig,
    ) -> Self {
        Self {
            provider,
            config,
            policy,
            markets,
        }
    }

    /// Never fails: an unreachable model yields a degraded decision.
    pub async fn decide(&self, ctx: &TradeContext<'_>) -> TradeDecision {
        let market = ctx.package.market_type;
        let plan = match self.ask(ctx).await {
            Ok(output) => TradePlan::from_output(&output, market),
            Err(e) => {
                warn!(version = ctx.version, error = %e, "Trader failed");
                match ctx.previous {
                    Some(previous) => TradePlan {
                        action: previous.action,
                        choices: previous.choices,
                        rationale: format!("Trader unavailable, revising previous plan: {e}"),
                        degraded: true,
                    },
                    None => TradePlan::hold(format!("Trader unavailable, holding: {e}"), true),
                }
            }
        };

        let decision = self.build_decision(plan, ctx);
        info!(
            version = decision.version,
            action = ?decision.action,
            leverage = ?decision.leverage,
            margin_usd = %decision.margin_usd,
            degraded = decision.degraded,
            "Trade decision built"
        );
        decision
    }

    async fn ask(&self, ctx: &TradeContext<'_>) -> Result<TraderOutput, AgentError> {
        let request = CompletionRequest::json(
            "trader",
            trader_system_prompt(ctx.package.market_type),
            serde_json::to_string_pretty(&trader_input(ctx))?,
        );
        request_structured(self.provider.as_ref(), &request).await
    }

    /// Deterministic part of the trader: tiers in, numbers out.
    pub fn build_decision(&self, plan: TradePlan, ctx: &TradeContext<'_>) -> TradeDecision {
        let market = ctx.package.market_type;
        let mut plan = plan;
        plan.action = plan.action.for_market(market);

        let entry_price = match ctx.package.last_price() {
            Some(price) if price > Decimal::ZERO => price,
            _ => {
                plan = TradePlan::hold(
                    format!("No usable price for {}, holding", ctx.package.symbol),
                    true,
                );
                Decimal::ZERO
            }
        };

        let mut leverage = market
            .is_futures()
            .then(|| self.config.leverage_ladder.get(plan.choices.leverage_tier).max(1));
        let fraction = self.config.size_fractions.get(plan.choices.size_tier);
        let mut margin = margin_for(self.config.account_equity_usd, fraction, &self.policy);
        let mut stop_pct = stop_distance(
            self.config.volatility_bands.get(ctx.judge.volatility),
            self.config.stop_multipliers.get(plan.choices.stop_width),
        );

        let addressed_vetoes = match ctx.feedback {
            Some(assessment) if assessment.vetoed() => {
                for reason in &assessment.veto_reasons {
                    self.answer_veto(reason, &mut leverage, &mut stop_pct, &mut margin);
                }
                // The vetoed cap was computed for the old leverage; recheck at the final one.
                if assessment
                    .veto_reasons
                    .iter()
                    .any(|r| matches!(r, VetoReason::StopBeyondLiquidation { .. }))
                {
                    stop_pct = stop_pct.min(max_stop_distance(&self.policy, leverage));
                }
                assessment.veto_reasons.clone()
            }
            _ => vec![],
        };

        let decision = TradeDecision {
            version: ctx.version,
            action: plan.action,
            entry_price,
            stop_loss: None,
            take_profit: None,
            position_fraction: Decimal::ZERO,
            margin_usd: Decimal::ZERO,
            contract_value_usd: Decimal::ZERO,
            quantity: Decimal::ZERO,
            leverage,
            choices: plan.choices,
            rationale: plan.rationale,
            addressed_vetoes,
            degraded: plan.degraded,
            created_at: Utc::now(),
        };

        if decision.is_hold() {
            return decision;
        }

        let size = size_position(margin, leverage, entry_price, self.markets.params(market));
        let levels = levels(
            decision.action,
            entry_price,
            stop_pct,
            self.config.risk_reward_ratio,
        );
        let position_fraction = if self.config.account_equity_usd.is_zero() {
            Decimal::ZERO
        } else {
            (size.margin_usd / self.config.account_equity_usd).round_dp(6)
        };

        TradeDecision {
            stop_loss: levels.map(|l| l.stop_loss),
            take_profit: levels.map(|l| l.take_profit),
            position_fraction,
            margin_usd: size.margin_usd,
            contract_value_usd: size.contract_value_usd,
            quantity: size.quantity,
            ..decision
        }
    }

    fn answer_veto(
        &self,
        reason: &VetoReason,
        leverage: &mut Option<u32>,
        stop_pct: &mut Decimal,
        margin: &mut Decimal,
    ) {
        match reason {
            VetoReason::LeverageTooHigh {
                leverage: vetoed,
                max,
            } => {
                // Strictly below the vetoed value even if the model asks again.
                if let Some(current) = leverage.as_mut() {
                    *current = (*current).min(*max).min(vetoed.saturating_sub(1)).max(1);
                }
            }
            // Leverage is derived from the market type, so it already matches.
            VetoReason::LeverageMarketMismatch { .. } => {}
            VetoReason::MissingStop => {
                *stop_pct = (*stop_pct).max(self.policy.min_stop_distance_pct);
            }
            VetoReason::StopTooTight { min_pct, .. } => {
                *stop_pct = (*stop_pct).max(*min_pct);
            }
            VetoReason::StopBeyondLiquidation { max_pct, .. } => {
                *stop_pct = (*stop_pct).min(*max_pct);
            }
            VetoReason::PositionTooLarge { max_usd, .. } => {
                *margin = (*margin).min(*max_usd);
            }
            VetoReason::PositionTooSmall { min_usd, .. } => {
                *margin = (*margin).max(*min_usd);
            }
        }
    }
}

fn trader_input(ctx: &TradeContext<'_>) -> Value {
    let reports: Vec<Value> = ctx
        .reports
        .iter()
        .filter(|r| r.is_available())
        .map(|r| {
            json!({
                "analyst": r.analyst,
                "summary": r.summary,
                "confidence": r.confidence,
            })
        })
        .collect();

    json!({
        "symbol": ctx.package.symbol,
        "market_type": ctx.package.market_type,
        "last_price": ctx.package.last_price(),
        "judge": {
            "direction": ctx.judge.direction,
            "confidence": ctx.judge.confidence,
            "rationale": ctx.judge.rationale,
            "volatility": ctx.judge.volatility,
        },
        "analyst_reports": reports,
        "previous_plan": ctx.previous.map(|d| json!({
            "version": d.version,
            "action": d.action,
            "choices": d.choices,
            "leverage": d.leverage,
            "stop_distance_pct": d.stop_distance_pct(),
            "margin_usd": d.margin_usd,
        })),
        "risk_feedback": ctx.feedback.filter(|a| a.vetoed()).map(|a| json!({
            "veto_reasons": a.veto_reasons.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "adjustments": a.adjustments,
        })),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::risk::RiskGate;
    use crate::test_support::{sample_judge, sample_package, trader_json, ScriptedProvider};
    use quorum_models::{
        Adjustment, Direction, LeverageLadder, LeverageTier, RiskLevel, SizeTier, StopWidth,
    };
    use rust_decimal_macros::dec;

    fn node(provider: ScriptedProvider, config: TraderConfig) -> TraderNode {
        TraderNode::new(
            Arc::new(provider),
            config,
            RiskPolicy::default(),
            MarketsConfig::default(),
        )
    }

    fn veto(version: u32, reasons: Vec<VetoReason>) -> RiskAssessment {
        RiskAssessment {
            decision_version: version,
            risk_level: RiskLevel::High,
            passed: false,
            veto_reasons: reasons,
            adjustments: vec![Adjustment::CapLeverage { max: 10 }],
            assessed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn futures_long_is_sized_in_code() {
        let provider = ScriptedProvider::new("gpt").route("trader", |_| {
            Ok(trader_json("long", "moderate", "low", "normal"))
        });
        let trader = node(provider, TraderConfig::default());
        let package = sample_package(MarketType::Futures);
        let judge = sample_judge(Direction::Bullish, dec!(0.7));
        let decision = trader
            .decide(&TradeContext {
                version: 0,
                judge: &judge,
                reports: &[],
                package: &package,
                previous: None,
                feedback: None,
            })
            .await;

        assert_eq!(decision.action, TradeAction::Long);
        assert_eq!(decision.leverage, Some(2));
        assert_eq!(decision.margin_usd, dec!(100));
        assert_eq!(decision.position_fraction, dec!(0.1));
        // 100 * (1 - 0.0006) * 2
        assert_eq!(decision.contract_value_usd, dec!(199.88));
        assert_eq!(decision.quantity, dec!(0.0039976));
        // medium band 2.5%, normal width, 2:1 target
        assert_eq!(decision.stop_loss, Some(dec!(48750)));
        assert_eq!(decision.take_profit, Some(dec!(52500)));
        assert!(!decision.degraded);
    }

    #[tokio::test]
    async fn spot_uses_buy_and_no_leverage() {
        let provider = ScriptedProvider::new("gpt").route("trader", |_| {
            Ok(trader_json("long", "moderate", "high", "normal"))
        });
        let trader = node(provider, TraderConfig::default());
        let package = sample_package(MarketType::Spot);
        let judge = sample_judge(Direction::Bullish, dec!(0.7));
        let decision = trader
            .decide(&TradeContext {
                version: 0,
                judge: &judge,
                reports: &[],
                package: &package,
                previous: None,
                feedback: None,
            })
            .await;

        assert_eq!(decision.action, TradeAction::Buy);
        assert_eq!(decision.leverage, None);
        assert_eq!(decision.contract_value_usd, dec!(99.9));
    }

    #[tokio::test]
    async fn leverage_veto_forces_lower_leverage() {
        // The model insists on the high tier.
        let provider = ScriptedProvider::new("gpt").route("trader", |_| {
            Ok(trader_json("long", "moderate", "high", "normal"))
        });
        let config = TraderConfig {
            leverage_ladder: LeverageLadder {
                low: 2,
                medium: 5,
                high: 20,
            },
            ..TraderConfig::default()
        };
        let trader = node(provider, config);
        let package = sample_package(MarketType::Futures);
        let judge = sample_judge(Direction::Bullish, dec!(0.7));

        let first = trader
            .decide(&TradeContext {
                version: 0,
                judge: &judge,
                reports: &[],
                package: &package,
                previous: None,
                feedback: None,
            })
            .await;
        assert_eq!(first.leverage, Some(20));

        let feedback = veto(0, vec![VetoReason::LeverageTooHigh { leverage: 20, max: 10 }]);
        let second = trader
            .decide(&TradeContext {
                version: 1,
                judge: &judge,
                reports: &[],
                package: &package,
                previous: Some(&first),
                feedback: Some(&feedback),
            })
            .await;
        assert_eq!(second.version, 1);
        assert_eq!(second.leverage, Some(10));
        assert_eq!(second.addressed_vetoes, feedback.veto_reasons);
    }

    #[tokio::test]
    async fn unreachable_trader_holds_on_first_attempt() {
        let provider = ScriptedProvider::new("gpt").route("trader", |_| {
            Err(LlmError::Timeout {
                provider: "gpt".to_string(),
                seconds: 60,
            })
        });
        let trader = node(provider, TraderConfig::default());
        let package = sample_package(MarketType::Futures);
        let judge = sample_judge(Direction::Bullish, dec!(0.7));
        let decision = trader
            .decide(&TradeContext {
                version: 0,
                judge: &judge,
                reports: &[],
                package: &package,
                previous: None,
                feedback: None,
            })
            .await;

        assert!(decision.is_hold());
        assert!(decision.degraded);
        assert_eq!(decision.margin_usd, Decimal::ZERO);
        assert_eq!(decision.stop_loss, None);
        // Futures decisions always carry leverage.
        assert!(decision.leverage.is_some());
    }

    #[tokio::test]
    async fn unreachable_trader_revises_previous_plan() {
        let provider = ScriptedProvider::new("gpt");
        let trader = node(provider, TraderConfig::default());
        let package = sample_package(MarketType::Futures);
        let judge = sample_judge(Direction::Bearish, dec!(0.7));

        let plan = TradePlan {
            action: TradeAction::Short,
            choices: TradeChoices {
                size_tier: SizeTier::Aggressive,
                leverage_tier: LeverageTier::High,
                stop_width: StopWidth::Wide,
            },
            rationale: "fade the pump".to_string(),
            degraded: false,
        };
        let ctx = TradeContext {
            version: 0,
            judge: &judge,
            reports: &[],
            package: &package,
            previous: None,
            feedback: None,
        };
        let first = trader.build_decision(plan, &ctx);
        // 10x, medium band * 1.5 = 3.75%
        assert_eq!(first.stop_distance_pct(), Some(dec!(0.0375)));

        let feedback = veto(
            0,
            vec![VetoReason::StopBeyondLiquidation {
                distance_pct: dec!(0.0375),
                max_pct: dec!(0.03),
            }],
        );
        let second = trader
            .decide(&TradeContext {
                version: 1,
                previous: Some(&first),
                feedback: Some(&feedback),
                ..ctx
            })
            .await;
        assert!(second.degraded);
        assert_eq!(second.action, TradeAction::Short);
        assert_eq!(second.choices, first.choices);
        assert_eq!(second.stop_distance_pct(), Some(dec!(0.03)));
        assert_eq!(second.stop_loss, Some(dec!(51500)));
    }

    #[tokio::test]
    async fn liquidation_veto_holds_at_raised_leverage() {
        // The replan reply jumps from the medium tier (5x) to the high tier (10x).
        let provider = ScriptedProvider::new("gpt").route("trader", |_| {
            Ok(trader_json("long", "moderate", "high", "normal"))
        });
        let mut config = TraderConfig::default();
        config.volatility_bands.medium = dec!(0.3);
        let trader = node(provider, config);
        let package = sample_package(MarketType::Futures);
        let judge = sample_judge(Direction::Bullish, dec!(0.7));
        let ctx = TradeContext {
            version: 0,
            judge: &judge,
            reports: &[],
            package: &package,
            previous: None,
            feedback: None,
        };
        let plan = TradePlan {
            action: TradeAction::Long,
            choices: TradeChoices {
                leverage_tier: LeverageTier::Medium,
                ..TradeChoices::default()
            },
            rationale: "trend".to_string(),
            degraded: false,
        };
        let first = trader.build_decision(plan, &ctx);
        assert_eq!(first.leverage, Some(5));
        assert_eq!(first.stop_distance_pct(), Some(dec!(0.3)));

        let gate = RiskGate::new(RiskPolicy::default(), MarketsConfig::default());
        let feedback = gate.assess(&first, &package);
        assert_eq!(
            feedback.veto_reasons,
            vec![VetoReason::StopBeyondLiquidation {
                distance_pct: dec!(0.3),
                max_pct: dec!(0.16),
            }]
        );

        let second = trader
            .decide(&TradeContext {
                version: 1,
                previous: Some(&first),
                feedback: Some(&feedback),
                ..ctx
            })
            .await;
        assert_eq!(second.leverage, Some(10));
        assert_eq!(second.stop_distance_pct(), Some(dec!(0.08)));
        assert!(gate.assess(&second, &package).passed);
    }

    #[test]
    fn margin_vetoes_move_margin_to_bound() {
        let trader = node(ScriptedProvider::new("gpt"), TraderConfig::default());
        let package = sample_package(MarketType::Spot);
        let judge = sample_judge(Direction::Bullish, dec!(0.7));
        let feedback = veto(
            0,
            vec![VetoReason::PositionTooLarge {
                margin_usd: dec!(200),
                max_usd: dec!(50),
            }],
        );
        let ctx = TradeContext {
            version: 1,
            judge: &judge,
            reports: &[],
            package: &package,
            previous: None,
            feedback: Some(&feedback),
        };
        let plan = TradePlan {
            action: TradeAction::Buy,
            choices: TradeChoices {
                size_tier: SizeTier::Aggressive,
                ..TradeChoices::default()
            },
            rationale: "breakout".to_string(),
            degraded: false,
        };
        let decision = trader.build_decision(plan, &ctx);
        assert_eq!(decision.margin_usd, dec!(50));
        assert_eq!(decision.position_fraction, dec!(0.05));
    }

    #[test]
    fn missing_price_means_hold() {
        let trader = node(ScriptedProvider::new("gpt"), TraderConfig::default());
        let mut package = sample_package(MarketType::Futures);
        package.last_price = None;
        package.candles.clear();
        let judge = sample_judge(Direction::Bullish, dec!(0.9));
        let ctx = TradeContext {
            version: 0,
            judge: &judge,
            reports: &[],
            package: &package,
            previous: None,
            feedback: None,
        };
        let plan = TradePlan {
            action: TradeAction::Long,
            choices: TradeChoices::default(),
            rationale: "go".to_string(),
            degraded: false,
        };
        let decision = trader.build_decision(plan, &ctx);
        assert!(decision.is_hold());
        assert!(decision.degraded);
        assert_eq!(decision.leverage, Some(2));
    }

    #[test]
    fn feedback_reaches_the_prompt() {
        let package = sample_package(MarketType::Futures);
        let judge = sample_judge(Direction::Bullish, dec!(0.7));
        let feedback = veto(0, vec![VetoReason::LeverageTooHigh { leverage: 20, max: 10 }]);
        let input = trader_input(&TradeContext {
            version: 1,
            judge: &judge,
            reports: &[],
            package: &package,
            previous: None,
            feedback: Some(&feedback),
        });
        let reasons = input["risk_feedback"]["veto_reasons"].as_array().unwrap();
        assert!(reasons[0].as_str().unwrap().contains("leverage too high"));
        assert_eq!(input["risk_feedback"]["adjustments"][0]["kind"], "cap_leverage");
    }
}
