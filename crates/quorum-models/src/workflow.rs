use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::analyst::AnalystReport;
use crate::debate::{CommitteeOpinion, DebateLog, JudgeStance};
use crate::decision::{FinalApproval, RiskAssessment, TradeDecision};
use crate::market::{MarketDataPackage, MarketType};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowStateError {
    #[error("decision version {got} recorded, expected {expected}")]
    VersionMismatch { expected: u32, got: u32 },

    #[error("leverage {leverage:?} is invalid for a {market} decision")]
    LeverageInvariant {
        market: MarketType,
        leverage: Option<u32>,
    },

    #[error("assessment for version {got} recorded, expected {expected:?}")]
    AssessmentMismatch { expected: Option<u32>, got: u32 },
}

/// What the gate does after a veto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VetoOutcome {
    /// Budget left: send the reasons back to the trader.
    Replan,
    /// Budget spent: hand off to the fund manager with risk unresolved.
    Escalate,
}

/// Everything a single pipeline run has produced so far.
///
/// Owned by one run; discarded once the report is assembled. Decision
/// versions and assessments are only appended through the recording methods,
/// which keep them paired and in replan order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowState {
    pub run_id: Uuid,
    pub symbol: String,
    pub market_type: MarketType,
    pub started_at: DateTime<Utc>,
    pub max_replans: u32,
    pub analyst_reports: Vec<AnalystReport>,
    pub debate: DebateLog,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub committee_opinions: Vec<CommitteeOpinion>,
    pub judge: Option<JudgeStance>,
    decisions: Vec<TradeDecision>,
    assessments: Vec<RiskAssessment>,
    replan_count: u32,
    risk_unresolved: bool,
    pub final_approval: Option<FinalApproval>,
}

impl WorkflowState {
    pub fn new(package: &MarketDataPackage, max_replans: u32) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            symbol: package.symbol.clone(),
            market_type: package.market_type,
            started_at: Utc::now(),
            max_replans,
            analyst_reports: vec![],
            debate: DebateLog::new(),
            committee_opinions: vec![],
            judge: None,
            decisions: vec![],
            assessments: vec![],
            replan_count: 0,
            risk_unresolved: false,
            final_approval: None,
        }
    }

    pub fn replan_count(&self) -> u32 {
        self.replan_count
    }

    pub fn risk_unresolved(&self) -> bool {
        self.risk_unresolved
    }

    pub fn decisions(&self) -> &[TradeDecision] {
        &self.decisions
    }

    pub fn assessments(&self) -> &[RiskAssessment] {
        &self.assessments
    }

    pub fn current_decision(&self) -> Option<&TradeDecision> {
        self.decisions.last()
    }

    pub fn last_assessment(&self) -> Option<&RiskAssessment> {
        self.assessments.last()
    }

    /// Append the decision for the current replan count.
    pub fn record_decision(&mut self, decision: TradeDecision) -> Result<(), WorkflowStateError> {
        let expected = self.replan_count;
        if decision.version != expected || self.decisions.len() as u32 != expected {
            return Err(WorkflowStateError::VersionMismatch {
                expected,
                got: decision.version,
            });
        }
        if decision.leverage.is_some() != self.market_type.is_futures() {
            return Err(WorkflowStateError::LeverageInvariant {
                market: self.market_type,
                leverage: decision.leverage,
            });
        }
        self.decisions.push(decision);
        Ok(())
    }

    /// Append the gate's verdict on the current decision.
    pub fn record_assessment(
        &mut self,
        assessment: RiskAssessment,
    ) -> Result<(), WorkflowStateError> {
        let expected = self.current_decision().map(|d| d.version);
        let pending = self.assessments.len() < self.decisions.len();
        if !pending || expected != Some(assessment.decision_version) {
            return Err(WorkflowStateError::AssessmentMismatch {
                expected: if pending { expected } else { None },
                got: assessment.decision_version,
            });
        }
        self.assessments.push(assessment);
        Ok(())
    }

    /// Spend one replan if the budget allows; otherwise mark the risk as
    /// unresolved. `replan_count` never exceeds `max_replans`.
    pub fn register_veto(&mut self) -> VetoOutcome {
        if self.replan_count < self.max_replans {
            self.replan_count += 1;
            VetoOutcome::Replan
        } else {
            self.risk_unresolved = true;
            VetoOutcome::Escalate
        }
    }
}
