use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AnalystKind {
    Technical,
    Sentiment,
    Fundamental,
    News,
}

impl AnalystKind {
    pub const ALL: [AnalystKind; 4] = [
        AnalystKind::Technical,
        AnalystKind::Sentiment,
        AnalystKind::Fundamental,
        AnalystKind::News,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnalystKind::Technical => "technical",
            AnalystKind::Sentiment => "sentiment",
            AnalystKind::Fundamental => "fundamental",
            AnalystKind::News => "news",
        }
    }
}

impl std::fmt::Display for AnalystKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReportStatus {
    Available,
    Unavailable { reason: String },
}

/// Output of one analyst for one run. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalystReport {
    pub analyst: AnalystKind,
    /// Provider that produced the report, if any call succeeded.
    pub model: Option<String>,
    pub summary: String,
    pub bullish_points: Vec<String>,
    pub bearish_points: Vec<String>,
    /// 0.0 to 1.0.
    pub confidence: Decimal,
    pub status: ReportStatus,
    pub elapsed_ms: u64,
}

impl AnalystReport {
    /// Placeholder for an analyst whose calls were exhausted.
    pub fn unavailable(analyst: AnalystKind, reason: impl Into<String>, elapsed_ms: u64) -> Self {
        let reason = reason.into();
        Self {
            analyst,
            model: None,
            summary: format!("{analyst} analyst unavailable: {reason}"),
            bullish_points: vec![],
            bearish_points: vec![],
            confidence: Decimal::ZERO,
            status: ReportStatus::Unavailable { reason },
            elapsed_ms,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.status, ReportStatus::Available)
    }

    /// Resolve a claim reference against this report.
    pub fn claim(&self, polarity: ClaimPolarity, index: usize) -> Option<&str> {
        let points = match polarity {
            ClaimPolarity::Bullish => &self.bullish_points,
            ClaimPolarity::Bearish => &self.bearish_points,
        };
        points.get(index).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClaimPolarity {
    Bullish,
    Bearish,
}

/// Pointer to one bullish/bearish point of an analyst report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ClaimRef {
    pub analyst: AnalystKind,
    pub polarity: ClaimPolarity,
    pub index: usize,
}

impl ClaimRef {
    /// Check the reference against a report set.
    pub fn resolves(&self, reports: &[AnalystReport]) -> bool {
        reports
            .iter()
            .find(|r| r.analyst == self.analyst)
            .and_then(|r| r.claim(self.polarity, self.index))
            .is_some()
    }
}
