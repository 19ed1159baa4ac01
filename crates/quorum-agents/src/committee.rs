use std::sync::Arc;

use quorum_models::{ClaimRef, MergeStrategyKind, ModelOpinion};
use rust_decimal::Decimal;

/// One side's committee collapsed into a single stance.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedStance {
    pub stance: String,
    pub confidence: Decimal,
    pub key_points: Vec<String>,
    pub claim_refs: Vec<ClaimRef>,
    pub models: Vec<String>,
}

/// Folds several model opinions into one stance.
pub trait CommitteeMergeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Combined confidence of the opinions. Only called with a non-empty slice.
    fn confidence(&self, opinions: &[ModelOpinion]) -> Decimal;

    /// `None` when there is nothing to merge.
    fn merge(&self, opinions: &[ModelOpinion]) -> Option<MergedStance> {
        if opinions.is_empty() {
            return None;
        }
        let mut key_points: Vec<String> = Vec::new();
        let mut claim_refs: Vec<ClaimRef> = Vec::new();
        for opinion in opinions {
            for point in &opinion.key_points {
                if !key_points.contains(point) {
                    key_points.push(point.clone());
                }
            }
            for claim in &opinion.claim_refs {
                if !claim_refs.contains(claim) {
                    claim_refs.push(claim.clone());
                }
            }
        }
        let stance = opinions
            .iter()
            .map(|o| format!("[{}] {}", o.model, o.stance))
            .collect::<Vec<_>>()
            .join("\n");

        Some(MergedStance {
            stance,
            confidence: self.confidence(opinions).round_dp(4),
            key_points,
            claim_refs,
            models: opinions.iter().map(|o| o.model.clone()).collect(),
        })
    }
}

/// Arithmetic mean of the confidences.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanConfidence;

impl CommitteeMergeStrategy for MeanConfidence {
    fn name(&self) -> &'static str {
        "mean"
    }

    fn confidence(&self, opinions: &[ModelOpinion]) -> Decimal {
        let sum: Decimal = opinions.iter().map(|o| o.confidence).sum();
        sum / Decimal::from(opinions.len())
    }
}

/// Each opinion weighted by its own confidence: `Σc² / Σc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceWeighted;

impl CommitteeMergeStrategy for ConfidenceWeighted {
    fn name(&self) -> &'static str {
        "confidence_weighted"
    }

    fn confidence(&self, opinions: &[ModelOpinion]) -> Decimal {
        let total: Decimal = opinions.iter().map(|o| o.confidence).sum();
        if total.is_zero() {
            return Decimal::ZERO;
        }
        let weighted: Decimal = opinions.iter().map(|o| o.confidence * o.confidence).sum();
        weighted / total
    }
}

pub fn merge_strategy(kind: MergeStrategyKind) -> Arc<dyn CommitteeMergeStrategy> {
    match kind {
        MergeStrategyKind::Mean => Arc::new(MeanConfidence),
        MergeStrategyKind::ConfidenceWeighted => Arc::new(ConfidenceWeighted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_models::{AnalystKind, ClaimPolarity};
    use rust_decimal_macros::dec;

    fn opinion(model: &str, confidence: Decimal, points: &[&str]) -> ModelOpinion {
        ModelOpinion {
            model: model.to_string(),
            stance: format!("{model} is bullish"),
            confidence,
            key_points: points.iter().map(|p| p.to_string()).collect(),
            claim_refs: vec![ClaimRef {
                analyst: AnalystKind::Technical,
                polarity: ClaimPolarity::Bullish,
                index: 0,
            }],
        }
    }

    #[test]
    fn mean_of_point_six_and_point_eight() {
        let merged = MeanConfidence
            .merge(&[
                opinion("gpt", dec!(0.6), &["ETF inflows"]),
                opinion("claude", dec!(0.8), &["Higher lows", "ETF inflows"]),
            ])
            .unwrap();
        assert_eq!(merged.confidence, dec!(0.7));
        assert!(merged.stance.contains("gpt is bullish"));
        assert!(merged.stance.contains("claude is bullish"));
        assert_eq!(merged.key_points, vec!["ETF inflows", "Higher lows"]);
        assert_eq!(merged.claim_refs.len(), 1);
        assert_eq!(merged.models, vec!["gpt", "claude"]);
    }

    #[test]
    fn weighted_leans_toward_confident_models() {
        let opinions = [opinion("a", dec!(0.2), &[]), opinion("b", dec!(0.8), &[])];
        let merged = ConfidenceWeighted.merge(&opinions).unwrap();
        // (0.04 + 0.64) / 1.0
        assert_eq!(merged.confidence, dec!(0.68));
        assert!(merged.confidence > MeanConfidence.merge(&opinions).unwrap().confidence);
    }

    #[test]
    fn weighted_handles_all_zero() {
        let opinions = [opinion("a", dec!(0), &[]), opinion("b", dec!(0), &[])];
        assert_eq!(ConfidenceWeighted.merge(&opinions).unwrap().confidence, dec!(0));
    }

    #[test]
    fn empty_committee_merges_to_none() {
        assert!(MeanConfidence.merge(&[]).is_none());
        assert_eq!(merge_strategy(MergeStrategyKind::ConfidenceWeighted).name(), "confidence_weighted");
    }
}
