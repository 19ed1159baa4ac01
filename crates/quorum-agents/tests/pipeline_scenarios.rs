//! End-to-end pipeline runs against scripted providers.
//!
//! Each test wires a `Pipeline` through `ProviderRegistry` exactly as the
//! binary does, so retry wrapping, role routing and the veto loop are all
//! exercised together.

use std::sync::Arc;

use quorum_agents::test_support::{
    judge_json, research_json, sample_package, test_pipeline_config, trader_json,
    ScriptedProvider,
};
use quorum_agents::{LlmError, Pipeline, ProviderRegistry};
use quorum_models::{
    AnalystKind, ApprovalStatus, DebateMode, DebateRole, MarketType, OverrideReason, RunStatus,
    TradeAction, VetoReason,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn registry(providers: Vec<Arc<ScriptedProvider>>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for provider in providers {
        registry.insert(provider);
    }
    registry
}

fn timeout() -> LlmError {
    LlmError::Timeout {
        provider: "gpt".to_string(),
        seconds: 60,
    }
}

#[tokio::test]
async fn futures_happy_path_is_approved() {
    let provider = Arc::new(ScriptedProvider::new("gpt").with_pipeline_defaults());
    let pipeline = Pipeline::from_registry(test_pipeline_config(), &registry(vec![provider.clone()]))
        .unwrap();

    let report = pipeline.run(sample_package(MarketType::Futures)).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.symbol, "BTCUSDT");
    let approval = report.final_approval().unwrap();
    assert_eq!(approval.status, ApprovalStatus::Approved);
    assert_eq!(approval.decision.action, TradeAction::Long);
    assert_eq!(approval.decision.leverage, Some(2));
    assert_eq!(approval.decision.contract_value_usd, dec!(199.88));

    // Two rounds of bull and bear, then the judge.
    let roles: Vec<_> = report.trace.debate.turns().iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        vec![
            DebateRole::Bull,
            DebateRole::Bear,
            DebateRole::Bull,
            DebateRole::Bear,
            DebateRole::Judge
        ]
    );
    assert_eq!(provider.calls("trader"), 1);
}

#[tokio::test]
async fn spot_run_trades_without_leverage() {
    let provider = Arc::new(ScriptedProvider::new("gpt").with_pipeline_defaults());
    let pipeline =
        Pipeline::from_registry(test_pipeline_config(), &registry(vec![provider])).unwrap();

    let report = pipeline.run(sample_package(MarketType::Spot)).await;
    let decision = &report.final_approval().unwrap().decision;
    assert_eq!(decision.action, TradeAction::Buy);
    assert_eq!(decision.leverage, None);
}

#[tokio::test]
async fn leverage_veto_triggers_lower_leverage_replan() {
    let provider = Arc::new(
        ScriptedProvider::new("gpt")
            .route("trader", |_| Ok(trader_json("long", "moderate", "high", "normal")))
            .with_pipeline_defaults(),
    );
    let mut config = test_pipeline_config();
    config.trader.leverage_ladder.high = 20;
    let pipeline = Pipeline::from_registry(config, &registry(vec![provider.clone()])).unwrap();

    let report = pipeline.run(sample_package(MarketType::Futures)).await;
    let trace = &report.trace;

    assert_eq!(trace.replan_count(), 1);
    assert_eq!(trace.decisions().len(), 2);
    assert_eq!(trace.assessments().len(), 2);
    assert!(trace.assessments()[0]
        .veto_reasons
        .contains(&VetoReason::LeverageTooHigh { leverage: 20, max: 10 }));
    assert!(trace.assessments()[1].passed);

    let first = trace.decisions()[0].leverage.unwrap();
    let second = trace.decisions()[1].leverage.unwrap();
    assert!(second < first);
    assert_eq!(trace.decisions()[1].version, 1);
    assert!(!trace.decisions()[1].addressed_vetoes.is_empty());
    assert!(report.final_approval().unwrap().is_approved());
    assert_eq!(provider.calls("trader"), 2);
}

#[tokio::test]
async fn unresolvable_veto_escalates_to_hold() {
    let provider = Arc::new(ScriptedProvider::new("gpt").with_pipeline_defaults());
    let mut config = test_pipeline_config();
    // A 50% minimum stop can never fit inside 2x liquidation distance.
    config.risk.min_stop_distance_pct = dec!(0.5);
    let pipeline = Pipeline::from_registry(config, &registry(vec![provider])).unwrap();

    let report = pipeline.run(sample_package(MarketType::Futures)).await;
    let trace = &report.trace;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(trace.replan_count(), 2);
    assert_eq!(trace.decisions().len(), 3);
    assert!(trace.assessments().iter().all(|a| !a.passed));
    assert!(trace.risk_unresolved());

    let approval = report.final_approval().unwrap();
    assert_eq!(
        approval.status,
        ApprovalStatus::OverriddenToHold {
            cause: OverrideReason::RiskUnresolved
        }
    );
    assert!(approval.risk_unresolved);
    assert!(approval.decision.is_hold());
    assert_eq!(approval.decision.margin_usd, Decimal::ZERO);
}

#[tokio::test]
async fn sentiment_timing_out_every_attempt_degrades() {
    let provider = Arc::new(
        ScriptedProvider::new("gpt")
            .route("analyst:sentiment", |_| Err(timeout()))
            .with_pipeline_defaults(),
    );
    let pipeline =
        Pipeline::from_registry(test_pipeline_config(), &registry(vec![provider.clone()]))
            .unwrap();

    let report = pipeline.run(sample_package(MarketType::Futures)).await;
    let reports = &report.trace.analyst_reports;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(reports.len(), 4);
    assert_eq!(reports.iter().filter(|r| r.is_available()).count(), 3);
    let sentiment = reports
        .iter()
        .find(|r| r.analyst == AnalystKind::Sentiment)
        .unwrap();
    assert!(!sentiment.is_available());
    assert_eq!(sentiment.confidence, Decimal::ZERO);
    assert_eq!(provider.calls("analyst:sentiment"), 3);
    assert!(report.final_approval().is_some());
}

#[tokio::test]
async fn sentiment_recovers_on_third_attempt() {
    let provider = Arc::new(
        ScriptedProvider::new("gpt")
            .route("analyst:sentiment", |call| {
                if call < 2 {
                    Err(timeout())
                } else {
                    Ok(quorum_agents::test_support::analyst_json(0.6))
                }
            })
            .with_pipeline_defaults(),
    );
    let pipeline =
        Pipeline::from_registry(test_pipeline_config(), &registry(vec![provider.clone()]))
            .unwrap();

    let report = pipeline.run(sample_package(MarketType::Futures)).await;
    assert!(report.trace.analyst_reports.iter().all(|r| r.is_available()));
    assert_eq!(provider.calls("analyst:sentiment"), 3);
}

#[tokio::test]
async fn committee_merges_bull_confidences() {
    let gpt = Arc::new(
        ScriptedProvider::new("gpt")
            .route("researcher:bull", |_| Ok(research_json("gpt sees a breakout", 0.6)))
            .with_pipeline_defaults(),
    );
    let claude = Arc::new(
        ScriptedProvider::new("claude")
            .route("researcher:bull", |_| Ok(research_json("claude sees higher lows", 0.8)))
            .route("researcher:bear", |_| Ok(research_json("claude worries about funding", 0.5))),
    );
    let mut config = test_pipeline_config();
    config.debate.mode = DebateMode::Committee;
    config.debate.rounds = 1;
    config.debate.bull = vec!["gpt".to_string(), "claude".to_string()];
    config.debate.bear = vec!["gpt".to_string(), "claude".to_string()];
    let pipeline = Pipeline::from_registry(config, &registry(vec![gpt, claude])).unwrap();

    let report = pipeline.run(sample_package(MarketType::Futures)).await;
    let turns = report.trace.debate.turns();

    let bull_turns: Vec<_> = turns.iter().filter(|t| t.role == DebateRole::Bull).collect();
    assert_eq!(bull_turns.len(), 1);
    assert_eq!(bull_turns[0].confidence, dec!(0.7));
    assert!(bull_turns[0].stance.contains("gpt sees a breakout"));
    assert!(bull_turns[0].stance.contains("claude sees higher lows"));
    assert_eq!(bull_turns[0].models, vec!["gpt", "claude"]);
    assert!(!report.trace.committee_opinions.is_empty());
}

#[tokio::test]
async fn weak_judge_conviction_holds() {
    let provider = Arc::new(
        ScriptedProvider::new("gpt")
            .route("judge", |_| Ok(judge_json("bullish", 0.4, &[0, 1])))
            .with_pipeline_defaults(),
    );
    let pipeline =
        Pipeline::from_registry(test_pipeline_config(), &registry(vec![provider])).unwrap();

    let report = pipeline.run(sample_package(MarketType::Futures)).await;
    let approval = report.final_approval().unwrap();

    assert!(matches!(
        approval.status,
        ApprovalStatus::OverriddenToHold {
            cause: OverrideReason::LowConviction { .. }
        }
    ));
    assert!(approval.decision.is_hold());
    // The trader's own proposal stays in the trace.
    assert_eq!(report.trace.decisions()[0].action, TradeAction::Long);
}

#[tokio::test]
async fn garbage_everywhere_still_completes_with_hold() {
    let provider = Arc::new(
        ScriptedProvider::new("gpt").fallback(|_| Ok("I'd rather not say.".to_string())),
    );
    let pipeline =
        Pipeline::from_registry(test_pipeline_config(), &registry(vec![provider])).unwrap();

    let report = pipeline.run(sample_package(MarketType::Futures)).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert!(report.trace.analyst_reports.iter().all(|r| !r.is_available()));
    assert!(report.trace.judge.as_ref().unwrap().degraded);
    let approval = report.final_approval().unwrap();
    assert!(approval.decision.is_hold());
    assert!(approval.decision.degraded);
}
