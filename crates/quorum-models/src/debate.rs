use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analyst::ClaimRef;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DebateRole {
    Bull,
    Bear,
    Neutral,
    FactChecker,
    Judge,
}

impl DebateRole {
    pub fn as_str(self) -> &'static str {
        match self {
            DebateRole::Bull => "bull",
            DebateRole::Bear => "bear",
            DebateRole::Neutral => "neutral",
            DebateRole::FactChecker => "fact_checker",
            DebateRole::Judge => "judge",
        }
    }

    /// The opposing side for bull/bear; `None` for the other roles.
    pub fn opponent(self) -> Option<DebateRole> {
        match self {
            DebateRole::Bull => Some(DebateRole::Bear),
            DebateRole::Bear => Some(DebateRole::Bull),
            _ => None,
        }
    }
}

impl std::fmt::Display for DebateRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Volatility {
    Low,
    #[default]
    Medium,
    High,
}

/// A point the fact-checker could not support from the market data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlaggedClaim {
    pub turn_index: usize,
    pub claim: String,
    pub reason: String,
}

/// One entry in the debate transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateTurn {
    /// Position in the transcript. Assigned by [`DebateLog::push`].
    pub index: usize,
    pub role: DebateRole,
    pub round: u32,
    pub stance: String,
    pub confidence: Decimal,
    pub key_points: Vec<String>,
    pub claim_refs: Vec<ClaimRef>,
    /// Indices of earlier turns this one answers.
    pub replies_to: Vec<usize>,
    /// Providers whose output went into this turn.
    pub models: Vec<String>,
    /// The side's call failed and its previous turn was repeated.
    pub carried_forward: bool,
    /// The turn is a safe default, not model output.
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flagged_claims: Vec<FlaggedClaim>,
    pub created_at: DateTime<Utc>,
}

impl DebateTurn {
    pub fn new(role: DebateRole, round: u32, stance: impl Into<String>, confidence: Decimal) -> Self {
        Self {
            index: 0,
            role,
            round,
            stance: stance.into(),
            confidence,
            key_points: vec![],
            claim_refs: vec![],
            replies_to: vec![],
            models: vec![],
            carried_forward: false,
            degraded: false,
            flagged_claims: vec![],
            created_at: Utc::now(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DebateLogError {
    #[error("turn in round {round} does not reference any earlier turn")]
    Ungrounded { round: u32 },

    #[error("turn {index} references turn {target}, which is not earlier")]
    ForwardReference { index: usize, target: usize },

    #[error("turn for round {got} appended after round {last}")]
    RoundRegression { last: u32, got: u32 },
}

/// Append-only transcript, totally ordered by round then insertion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct DebateLog {
    turns: Vec<DebateTurn>,
}

impl DebateLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn, assigning its index.
    ///
    /// Rejects turns after round 0 that reference no earlier turn, references
    /// that point forward, and rounds lower than the last appended turn.
    pub fn push(&mut self, mut turn: DebateTurn) -> Result<usize, DebateLogError> {
        let index = self.turns.len();
        if let Some(last) = self.turns.last() {
            if turn.round < last.round {
                return Err(DebateLogError::RoundRegression {
                    last: last.round,
                    got: turn.round,
                });
            }
        }
        if turn.round > 0 && turn.replies_to.is_empty() {
            return Err(DebateLogError::Ungrounded { round: turn.round });
        }
        if let Some(&target) = turn.replies_to.iter().find(|&&t| t >= index) {
            return Err(DebateLogError::ForwardReference { index, target });
        }
        turn.index = index;
        self.turns.push(turn);
        Ok(index)
    }

    pub fn turns(&self) -> &[DebateTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DebateTurn> {
        self.turns.get(index)
    }

    /// Most recent turn of a role.
    pub fn latest(&self, role: DebateRole) -> Option<&DebateTurn> {
        self.turns.iter().rev().find(|t| t.role == role)
    }

    pub fn last_round(&self) -> Option<u32> {
        self.turns.last().map(|t| t.round)
    }
}

/// One model's opinion inside a committee.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelOpinion {
    pub model: String,
    pub stance: String,
    pub confidence: Decimal,
    pub key_points: Vec<String>,
    pub claim_refs: Vec<ClaimRef>,
}

/// All opinions gathered for one side in one round of committee mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitteeOpinion {
    pub side: DebateRole,
    pub round: u32,
    pub opinions: Vec<ModelOpinion>,
}

/// The judge's synthesis of the debate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JudgeStance {
    pub direction: Direction,
    pub confidence: Decimal,
    pub rationale: String,
    pub cited_turns: Vec<usize>,
    pub volatility: Volatility,
    pub degraded: bool,
}

impl JudgeStance {
    /// Neutral stance used when the judge cannot be reached.
    pub fn neutral_default(reason: &str) -> Self {
        Self {
            direction: Direction::Neutral,
            confidence: Decimal::new(5, 1),
            rationale: format!("Judge unavailable, defaulting to neutral: {reason}"),
            cited_turns: vec![],
            volatility: Volatility::Medium,
            degraded: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn turn(role: DebateRole, round: u32, replies_to: Vec<usize>) -> DebateTurn {
        let mut t = DebateTurn::new(role, round, "stance", dec!(0.6));
        t.replies_to = replies_to;
        t
    }

    #[test]
    fn push_assigns_sequential_indices() {
        let mut log = DebateLog::new();
        assert_eq!(log.push(turn(DebateRole::Bull, 0, vec![])).unwrap(), 0);
        assert_eq!(log.push(turn(DebateRole::Bear, 0, vec![])).unwrap(), 1);
        assert_eq!(log.push(turn(DebateRole::Bull, 1, vec![1, 0])).unwrap(), 2);
        assert_eq!(log.get(2).unwrap().index, 2);
        assert_eq!(log.latest(DebateRole::Bull).unwrap().index, 2);
        assert_eq!(log.last_round(), Some(1));
    }

    #[test]
    fn rejects_ungrounded_rebuttal() {
        let mut log = DebateLog::new();
        log.push(turn(DebateRole::Bull, 0, vec![])).unwrap();
        let err = log.push(turn(DebateRole::Bear, 1, vec![])).unwrap_err();
        assert_eq!(err, DebateLogError::Ungrounded { round: 1 });
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn rejects_forward_reference() {
        let mut log = DebateLog::new();
        log.push(turn(DebateRole::Bull, 0, vec![])).unwrap();
        let err = log.push(turn(DebateRole::Bear, 1, vec![1])).unwrap_err();
        assert_eq!(err, DebateLogError::ForwardReference { index: 1, target: 1 });
    }

    #[test]
    fn rejects_round_regression() {
        let mut log = DebateLog::new();
        log.push(turn(DebateRole::Bull, 0, vec![])).unwrap();
        log.push(turn(DebateRole::Bear, 1, vec![0])).unwrap();
        let err = log.push(turn(DebateRole::Bull, 0, vec![])).unwrap_err();
        assert_eq!(err, DebateLogError::RoundRegression { last: 1, got: 0 });
    }

    #[test]
    fn opponent_of_sides() {
        assert_eq!(DebateRole::Bull.opponent(), Some(DebateRole::Bear));
        assert_eq!(DebateRole::Bear.opponent(), Some(DebateRole::Bull));
        assert_eq!(DebateRole::Judge.opponent(), None);
    }

    #[test]
    fn neutral_default_is_half_confidence() {
        let stance = JudgeStance::neutral_default("timeout");
        assert_eq!(stance.direction, Direction::Neutral);
        assert_eq!(stance.confidence, dec!(0.5));
        assert!(stance.degraded);
    }
}
