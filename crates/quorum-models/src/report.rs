use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decision::FinalApproval;
use crate::market::MarketType;
use crate::workflow::WorkflowState;

pub const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    RunFailed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::RunFailed => "run_failed",
        }
    }
}

/// The persisted artifact of one pipeline run: the full trace plus outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionReport {
    pub id: Uuid,
    pub schema_version: u32,
    pub symbol: String,
    pub market_type: MarketType,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Present when `status` is `run_failed`.
    pub failure: Option<String>,
    /// Last captured state. For failed runs this is the diagnostic snapshot.
    pub trace: WorkflowState,
}

impl DecisionReport {
    pub fn final_approval(&self) -> Option<&FinalApproval> {
        self.trace.final_approval.as_ref()
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}
