use std::sync::Arc;

use futures_util::future::join_all;
use quorum_models::{
    AnalystReport, CommitteeOpinion, DebateLog, DebateMode, DebateRole, DebateTurn,
    FlaggedClaim, JudgeStance, MarketDataPackage, ModelOpinion, WorkflowState,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::committee::{CommitteeMergeStrategy, MeanConfidence, MergedStance};
use crate::error::WorkflowError;
use crate::llm::{CompletionRequest, LlmProvider};
use crate::outputs::{to_confidence, FactCheckOutput, JudgeOutput, ResearchOutput};
use crate::prompts::{fact_checker_system_prompt, judge_system_prompt, researcher_system_prompt};
use crate::structured::request_structured;

/// Multi-round bull/bear debate with an optional neutral voice and
/// fact-checker, closed by a judge.
///
/// Rounds are strictly sequential and the debate always stops after
/// `rounds`, whatever the models say. In committee mode each side's
/// providers run concurrently and their opinions are merged into one turn.
pub struct ResearchDebate {
    bull: Vec<Arc<dyn LlmProvider>>,
    bear: Vec<Arc<dyn LlmProvider>>,
    neutral: Option<Arc<dyn LlmProvider>>,
    fact_checker: Option<Arc<dyn LlmProvider>>,
    judge: Arc<dyn LlmProvider>,
    rounds: u32,
    mode: DebateMode,
    merge: Arc<dyn CommitteeMergeStrategy>,
}

impl ResearchDebate {
    /// Single-model debate. Only the first provider of each side is used
    /// unless committee mode is enabled.
    pub fn new(
        bull: Vec<Arc<dyn LlmProvider>>,
        bear: Vec<Arc<dyn LlmProvider>>,
        judge: Arc<dyn LlmProvider>,
        rounds: u32,
    ) -> Self {
        Self {
            bull,
            bear,
            neutral: None,
            fact_checker: None,
            judge,
            rounds: rounds.max(1),
            mode: DebateMode::Single,
            merge: Arc::new(MeanConfidence),
        }
    }

    pub fn with_committee(mut self, merge: Arc<dyn CommitteeMergeStrategy>) -> Self {
        self.mode = DebateMode::Committee;
        self.merge = merge;
        self
    }

    pub fn with_neutral(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.neutral = Some(provider);
        self
    }

    pub fn with_fact_checker(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.fact_checker = Some(provider);
        self
    }

    /// Run every round and the judge, writing turns and the stance into `state`.
    pub async fn run(
        &self,
        state: &mut WorkflowState,
        package: &MarketDataPackage,
    ) -> Result<(), WorkflowError> {
        for round in 0..self.rounds {
            let bull = self.side_turn(DebateRole::Bull, round, state, package).await?;
            let bear = self.side_turn(DebateRole::Bear, round, state, package).await?;

            if let Some(provider) = &self.neutral {
                self.neutral_turn(provider.as_ref(), round, [bull, bear], state, package)
                    .await?;
            }
            if let Some(provider) = &self.fact_checker {
                self.fact_check(provider.as_ref(), round, [bull, bear], state, package)
                    .await?;
            }
            info!(symbol = %state.symbol, round, turns = state.debate.len(), "Debate round complete");
        }

        let stance = self.judge(state, package).await?;
        info!(
            symbol = %state.symbol,
            direction = ?stance.direction,
            confidence = %stance.confidence,
            degraded = stance.degraded,
            "Judge ruled"
        );
        state.judge = Some(stance);
        Ok(())
    }

    fn providers(&self, role: DebateRole) -> &[Arc<dyn LlmProvider>] {
        let all = match role {
            DebateRole::Bull => &self.bull,
            DebateRole::Bear => &self.bear,
            _ => return &[],
        };
        match self.mode {
            DebateMode::Single => &all[..all.len().min(1)],
            DebateMode::Committee => all,
        }
    }

    async fn side_turn(
        &self,
        role: DebateRole,
        round: u32,
        state: &mut WorkflowState,
        package: &MarketDataPackage,
    ) -> Result<usize, WorkflowError> {
        let own_previous = state.debate.latest(role).map(|t| t.index);
        let opponent_latest = role
            .opponent()
            .and_then(|o| state.debate.latest(o))
            .map(|t| t.index);
        let replies_to: Vec<usize> = if round == 0 {
            vec![]
        } else {
            opponent_latest.into_iter().chain(own_previous).collect()
        };

        let request = research_request(role, round, state, package, &replies_to);
        let outcome = match self.mode {
            DebateMode::Single => match self.providers(role).first() {
                Some(provider) => {
                    request_structured::<ResearchOutput>(provider.as_ref(), &request)
                        .await
                        .map(|out| {
                            let opinion = to_opinion(provider.name(), out, &state.analyst_reports);
                            MergedStance {
                                stance: opinion.stance,
                                confidence: opinion.confidence,
                                key_points: opinion.key_points,
                                claim_refs: opinion.claim_refs,
                                models: vec![opinion.model],
                            }
                        })
                        .map_err(|e| e.to_string())
                }
                None => Err(format!("no provider for {role}")),
            },
            DebateMode::Committee => self.committee_turn(role, round, &request, state).await,
        };

        let turn = match outcome {
            Ok(merged) => {
                let mut turn = DebateTurn::new(role, round, merged.stance, merged.confidence);
                turn.key_points = merged.key_points;
                turn.claim_refs = merged.claim_refs;
                turn.models = merged.models;
                turn.replies_to = replies_to;
                turn
            }
            Err(reason) => fallback_turn(role, round, &state.debate, own_previous, replies_to, &reason),
        };
        Ok(state.debate.push(turn)?)
    }

    async fn committee_turn(
        &self,
        role: DebateRole,
        round: u32,
        request: &CompletionRequest,
        state: &mut WorkflowState,
    ) -> Result<MergedStance, String> {
        let providers = self.providers(role);
        let results = join_all(providers.iter().map(|provider| async move {
            let result = request_structured::<ResearchOutput>(provider.as_ref(), request).await;
            (provider.name().to_string(), result)
        }))
        .await;

        let mut opinions = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (model, result) in results {
            match result {
                Ok(out) => opinions.push(to_opinion(&model, out, &state.analyst_reports)),
                Err(e) => {
                    warn!(side = %role, round, model = %model, error = %e, "Committee member failed");
                    failures.push(format!("{model}: {e}"));
                }
            }
        }

        let merged = self.merge.merge(&opinions);
        state.committee_opinions.push(CommitteeOpinion {
            side: role,
            round,
            opinions,
        });
        merged.ok_or_else(|| format!("all committee members failed ({})", failures.join("; ")))
    }

    async fn neutral_turn(
        &self,
        provider: &dyn LlmProvider,
        round: u32,
        sides: [usize; 2],
        state: &mut WorkflowState,
        package: &MarketDataPackage,
    ) -> Result<(), WorkflowError> {
        let request = research_request(DebateRole::Neutral, round, state, package, &sides);
        match request_structured::<ResearchOutput>(provider, &request).await {
            Ok(out) => {
                let opinion = to_opinion(provider.name(), out, &state.analyst_reports);
                let mut turn =
                    DebateTurn::new(DebateRole::Neutral, round, opinion.stance, opinion.confidence);
                turn.key_points = opinion.key_points;
                turn.claim_refs = opinion.claim_refs;
                turn.models = vec![opinion.model];
                turn.replies_to = sides.to_vec();
                state.debate.push(turn)?;
            }
            Err(e) => warn!(round, error = %e, "Neutral researcher failed, skipping turn"),
        }
        Ok(())
    }

    async fn fact_check(
        &self,
        provider: &dyn LlmProvider,
        round: u32,
        sides: [usize; 2],
        state: &mut WorkflowState,
        package: &MarketDataPackage,
    ) -> Result<(), WorkflowError> {
        let checked: Vec<Value> = sides
            .iter()
            .filter_map(|&i| state.debate.get(i))
            .map(|t| json!({"index": t.index, "role": t.role, "key_points": t.key_points}))
            .collect();
        let input = json!({
            "symbol": package.symbol,
            "last_price": package.last_price(),
            "funding_rate": package.funding_rate,
            "analyst_reports": state.analyst_reports,
            "turns": checked,
        });
        let request = CompletionRequest::json("fact_checker", fact_checker_system_prompt(), render(&input));

        let output = match request_structured::<FactCheckOutput>(provider, &request).await {
            Ok(output) => output,
            Err(e) => {
                warn!(round, error = %e, "Fact-check failed, skipping");
                return Ok(());
            }
        };

        let flagged: Vec<FlaggedClaim> = output
            .flagged
            .into_iter()
            .filter(|f| sides.contains(&f.turn_index))
            .filter(|f| {
                state
                    .debate
                    .get(f.turn_index)
                    .is_some_and(|t| t.key_points.iter().any(|p| same_claim(p, &f.claim)))
            })
            .map(|f| FlaggedClaim {
                turn_index: f.turn_index,
                claim: f.claim,
                reason: f.reason,
            })
            .collect();

        let summary = if output.summary.trim().is_empty() {
            format!("{} claim(s) flagged", flagged.len())
        } else {
            output.summary
        };
        if !flagged.is_empty() {
            warn!(round, flagged = flagged.len(), "Fact-checker flagged claims");
        }
        let mut turn = DebateTurn::new(DebateRole::FactChecker, round, summary, Decimal::ONE);
        turn.replies_to = sides.to_vec();
        turn.models = vec![provider.name().to_string()];
        turn.flagged_claims = flagged;
        state.debate.push(turn)?;
        Ok(())
    }

    async fn judge(
        &self,
        state: &mut WorkflowState,
        package: &MarketDataPackage,
    ) -> Result<JudgeStance, WorkflowError> {
        let flagged = flagged_claims(&state.debate);
        let input = json!({
            "symbol": package.symbol,
            "market_type": package.market_type,
            "last_price": package.last_price(),
            "analyst_reports": state.analyst_reports,
            "transcript": transcript_view(&state.debate, &flagged),
        });
        let fallback_cites: Vec<usize> = [DebateRole::Bull, DebateRole::Bear]
            .iter()
            .filter_map(|&r| state.debate.latest(r).map(|t| t.index))
            .collect();

        let request = CompletionRequest::json("judge", judge_system_prompt(), render(&input));
        let stance = match request_structured::<JudgeOutput>(self.judge.as_ref(), &request).await {
            Ok(out) => {
                let mut cited: Vec<usize> = Vec::new();
                for &index in &out.cited_turns {
                    let citable = state.debate.get(index).is_some_and(|t| {
                        matches!(
                            t.role,
                            DebateRole::Bull | DebateRole::Bear | DebateRole::Neutral
                        )
                    });
                    if citable && !cited.contains(&index) {
                        cited.push(index);
                    }
                }
                if cited.is_empty() {
                    cited = fallback_cites;
                }
                JudgeStance {
                    direction: out.direction(),
                    confidence: to_confidence(out.confidence),
                    volatility: out.volatility(),
                    rationale: out.rationale,
                    cited_turns: cited,
                    degraded: false,
                }
            }
            Err(e) => {
                warn!(error = %e, "Judge failed, defaulting to neutral");
                let mut stance = JudgeStance::neutral_default(&e.to_string());
                stance.cited_turns = fallback_cites;
                stance
            }
        };

        let round = state.debate.last_round().unwrap_or(0);
        let mut turn = DebateTurn::new(DebateRole::Judge, round, stance.rationale.clone(), stance.confidence);
        turn.replies_to = stance.cited_turns.clone();
        turn.models = vec![self.judge.name().to_string()];
        turn.degraded = stance.degraded;
        state.debate.push(turn)?;
        Ok(stance)
    }
}

fn to_opinion(model: &str, out: ResearchOutput, reports: &[AnalystReport]) -> ModelOpinion {
    ModelOpinion {
        model: model.to_string(),
        stance: out.stance,
        confidence: to_confidence(out.confidence),
        key_points: out.key_points,
        claim_refs: out
            .claim_refs
            .iter()
            .filter_map(|c| c.to_claim_ref())
            .filter(|c| c.resolves(reports))
            .collect(),
    }
}

/// Repeat the side's previous turn, or open with a degraded neutral turn.
fn fallback_turn(
    role: DebateRole,
    round: u32,
    log: &DebateLog,
    own_previous: Option<usize>,
    replies_to: Vec<usize>,
    reason: &str,
) -> DebateTurn {
    match own_previous.and_then(|i| log.get(i)) {
        Some(previous) => {
            warn!(side = %role, round, error = %reason, "Side failed, carrying forward previous turn");
            let mut turn = DebateTurn::new(role, round, previous.stance.clone(), previous.confidence);
            turn.key_points = previous.key_points.clone();
            turn.claim_refs = previous.claim_refs.clone();
            turn.models = previous.models.clone();
            turn.replies_to = replies_to;
            turn.carried_forward = true;
            turn
        }
        None => {
            warn!(side = %role, round, error = %reason, "Side failed with nothing to carry, degrading");
            let mut turn = DebateTurn::new(
                role,
                round,
                format!("{role} researcher unavailable: {reason}"),
                Decimal::new(5, 1),
            );
            turn.replies_to = replies_to;
            turn.degraded = true;
            turn
        }
    }
}

fn research_request(
    role: DebateRole,
    round: u32,
    state: &WorkflowState,
    package: &MarketDataPackage,
    respond_to: &[usize],
) -> CompletionRequest {
    let previous_confidence = (round > 0)
        .then(|| state.debate.latest(role))
        .flatten()
        .map(|t| t.confidence);
    let input = json!({
        "symbol": package.symbol,
        "market_type": package.market_type,
        "last_price": package.last_price(),
        "round": round,
        "analyst_reports": state.analyst_reports,
        "transcript": transcript_view(&state.debate, &[]),
        "respond_to": respond_to,
        "previous_confidence": previous_confidence,
    });
    let system = researcher_system_prompt(role).unwrap_or_default();
    CompletionRequest::json(format!("researcher:{role}"), system, render(&input))
}

fn render(input: &Value) -> String {
    serde_json::to_string_pretty(input).unwrap_or_else(|_| input.to_string())
}

fn same_claim(point: &str, claim: &str) -> bool {
    point.trim().eq_ignore_ascii_case(claim.trim())
}

fn flagged_claims(log: &DebateLog) -> Vec<FlaggedClaim> {
    log.turns()
        .iter()
        .filter(|t| t.role == DebateRole::FactChecker)
        .flat_map(|t| t.flagged_claims.iter().cloned())
        .collect()
}

/// Argument turns as the models see them, minus flagged points.
fn transcript_view(log: &DebateLog, flagged: &[FlaggedClaim]) -> Vec<Value> {
    log.turns()
        .iter()
        .filter(|t| matches!(t.role, DebateRole::Bull | DebateRole::Bear | DebateRole::Neutral))
        .map(|t| {
            let key_points: Vec<&String> = t
                .key_points
                .iter()
                .filter(|p| {
                    !flagged
                        .iter()
                        .any(|f| f.turn_index == t.index && same_claim(p, &f.claim))
                })
                .collect();
            json!({
                "index": t.index,
                "role": t.role,
                "round": t.round,
                "stance": t.stance,
                "confidence": t.confidence,
                "key_points": key_points,
                "replies_to": t.replies_to,
            })
        })
        .collect()
}
