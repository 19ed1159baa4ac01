use std::sync::Arc;
use std::time::Instant;

use quorum_models::{
    DebateMode, DecisionReport, JudgeStance, MarketDataPackage, PipelineConfig, VetoOutcome,
    WorkflowState,
};
use tracing::{info, warn};

use crate::analyst::{Analyst, AnalystTeam, LlmAnalyst};
use crate::committee::merge_strategy;
use crate::debate::ResearchDebate;
use crate::error::{AgentError, WorkflowError};
use crate::fund_manager::FundManager;
use crate::llm::{LlmProvider, ProviderRegistry, RetryPolicy};
use crate::report::ReportAssembler;
use crate::risk::RiskGate;
use crate::trader::{TradeContext, TraderNode};

/// The whole decision run: analysts, debate, the trader and risk gate loop,
/// fund manager sign-off, then the report.
///
/// Holds only read-only configuration and provider handles, so one pipeline
/// can serve concurrent runs. Each run owns its `WorkflowState`.
pub struct Pipeline {
    config: PipelineConfig,
    analysts: AnalystTeam,
    debate: ResearchDebate,
    trader: TraderNode,
    risk: RiskGate,
    fund_manager: FundManager,
    assembler: ReportAssembler,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        analysts: AnalystTeam,
        debate: ResearchDebate,
        trader: TraderNode,
    ) -> Self {
        let risk = RiskGate::new(config.risk.clone(), config.markets.clone());
        let fund_manager = FundManager::new(config.fund_manager.clone());
        Self {
            config,
            analysts,
            debate,
            trader,
            risk,
            fund_manager,
            assembler: ReportAssembler,
        }
    }

    /// Wire every role to its configured provider, each wrapped in the
    /// retry policy.
    pub fn from_registry(
        config: PipelineConfig,
        registry: &ProviderRegistry,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        let policy = RetryPolicy::from(&config.retry);
        let provider = |name: &str| -> Result<Arc<dyn LlmProvider>, AgentError> {
            Ok(registry.retrying(name, &policy)?)
        };
        let role_provider = |explicit: Option<&String>| provider(config.provider_for(explicit).as_str());

        let analysts = config
            .analysts
            .members
            .iter()
            .filter(|member| member.enabled)
            .map(|member| {
                let llm = role_provider(member.provider.as_ref())?;
                let analyst: Arc<dyn Analyst> = Arc::new(LlmAnalyst::new(
                    member.kind,
                    llm,
                    config.analysts.candle_tail,
                ));
                Ok(analyst)
            })
            .collect::<Result<Vec<_>, AgentError>>()?;

        let debate_config = &config.debate;
        let side = |configured: &[String]| -> Result<Vec<Arc<dyn LlmProvider>>, AgentError> {
            debate_config
                .side_providers(configured, &config.default_provider)
                .iter()
                .map(|name| provider(name.as_str()))
                .collect()
        };
        let mut debate = ResearchDebate::new(
            side(&debate_config.bull)?,
            side(&debate_config.bear)?,
            role_provider(debate_config.judge_provider.as_ref())?,
            debate_config.rounds,
        );
        if debate_config.mode == DebateMode::Committee {
            debate = debate.with_committee(merge_strategy(debate_config.merge_strategy));
        }
        if debate_config.neutral {
            debate = debate.with_neutral(role_provider(debate_config.neutral_provider.as_ref())?);
        }
        if debate_config.fact_check {
            debate = debate.with_fact_checker(role_provider(
                debate_config.fact_checker_provider.as_ref(),
            )?);
        }

        let trader = TraderNode::new(
            role_provider(config.trader.provider.as_ref())?,
            config.trader.clone(),
            config.risk.clone(),
            config.markets.clone(),
        );

        Ok(Self::new(config, AnalystTeam::new(analysts), debate, trader))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run once over a package. Always returns a report; terminal failures
    /// come back as `run_failed` with the state captured so far.
    pub async fn run(&self, package: MarketDataPackage) -> DecisionReport {
        let start = Instant::now();
        let package = Arc::new(package);
        let mut state = WorkflowState::new(&package, self.config.max_replans);
        info!(
            run_id = %state.run_id,
            symbol = %package.symbol,
            market = %package.market_type,
            "Pipeline started"
        );

        let outcome = self.drive(&mut state, &package).await;
        info!(
            run_id = %state.run_id,
            replans = state.replan_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Pipeline finished"
        );
        self.assembler.assemble(state, outcome)
    }

    async fn drive(
        &self,
        state: &mut WorkflowState,
        package: &Arc<MarketDataPackage>,
    ) -> Result<(), WorkflowError> {
        state.analyst_reports = self.analysts.run(Arc::clone(package)).await;
        self.debate.run(state, package).await?;

        let judge = state
            .judge
            .clone()
            .unwrap_or_else(|| JudgeStance::neutral_default("no stance recorded"));

        loop {
            let decision = {
                let previous = state.current_decision();
                let ctx = TradeContext {
                    version: state.replan_count(),
                    judge: &judge,
                    reports: &state.analyst_reports,
                    package: package.as_ref(),
                    previous,
                    feedback: previous.and(state.last_assessment()),
                };
                self.trader.decide(&ctx).await
            };
            let assessment = self.risk.assess(&decision, package);
            let passed = assessment.passed;
            state.record_decision(decision)?;
            state.record_assessment(assessment)?;

            if passed {
                break;
            }
            match state.register_veto() {
                VetoOutcome::Replan => {
                    info!(replan = state.replan_count(), "Vetoed, replanning");
                }
                VetoOutcome::Escalate => {
                    warn!(
                        replans = state.replan_count(),
                        "Replan budget spent, escalating with risk unresolved"
                    );
                    break;
                }
            }
        }

        let approval = self.fund_manager.approve(state)?;
        state.final_approval = Some(approval);
        Ok(())
    }
}
