use chrono::Utc;
use quorum_models::{
    ApprovalStatus, FinalApproval, FundManagerPolicy, OverrideReason, WorkflowState,
};
use tracing::{info, warn};

use crate::error::WorkflowError;

/// Final sign-off on the current decision.
///
/// Unresolved risk always ends in a hold, whatever the trader proposed.
/// Conviction below the policy floor does too.
#[derive(Debug, Clone, Default)]
pub struct FundManager {
    policy: FundManagerPolicy,
}

impl FundManager {
    pub fn new(policy: FundManagerPolicy) -> Self {
        Self { policy }
    }

    pub fn approve(&self, state: &WorkflowState) -> Result<FinalApproval, WorkflowError> {
        let decision = state
            .current_decision()
            .ok_or(WorkflowError::MissingDecision)?;
        let assessment = state
            .last_assessment()
            .filter(|a| a.decision_version == decision.version)
            .ok_or(WorkflowError::MissingAssessment(decision.version))?;

        let mut notes = Vec::new();
        if state.replan_count() > 0 {
            notes.push(format!(
                "{} replan(s) before the final decision",
                state.replan_count()
            ));
        }
        if decision.degraded {
            notes.push("Decision was built from a degraded trader reply".to_string());
        }

        let risk_unresolved = state.risk_unresolved() || assessment.vetoed();
        let cause = if risk_unresolved {
            let reasons: Vec<String> = assessment
                .veto_reasons
                .iter()
                .map(ToString::to_string)
                .collect();
            notes.push(format!("Risk unresolved: {}", reasons.join("; ")));
            Some(OverrideReason::RiskUnresolved)
        } else {
            let confidence = state
                .judge
                .as_ref()
                .map(|j| j.confidence)
                .unwrap_or_default();
            let min = self.policy.min_judge_confidence;
            (!decision.is_hold() && confidence < min).then(|| {
                notes.push(format!(
                    "Judge confidence {confidence} below required {min}"
                ));
                OverrideReason::LowConviction { confidence, min }
            })
        };

        let approval = match cause {
            Some(cause) => {
                warn!(
                    symbol = %state.symbol,
                    version = decision.version,
                    cause = ?cause,
                    "Fund manager overrode decision to hold"
                );
                FinalApproval {
                    status: ApprovalStatus::OverriddenToHold { cause },
                    decision: decision.to_hold("Overridden to hold by the fund manager"),
                    risk_unresolved,
                    notes,
                    decided_at: Utc::now(),
                }
            }
            None => {
                info!(
                    symbol = %state.symbol,
                    version = decision.version,
                    action = ?decision.action,
                    "Fund manager approved decision"
                );
                FinalApproval {
                    status: ApprovalStatus::Approved,
                    decision: decision.clone(),
                    risk_unresolved: false,
                    notes,
                    decided_at: Utc::now(),
                }
            }
        };
        Ok(approval)
    }
}
