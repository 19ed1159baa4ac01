use chrono::Utc;
use quorum_models::{DecisionReport, RunStatus, WorkflowState, REPORT_SCHEMA_VERSION};
use tracing::{error, info};

use crate::error::WorkflowError;

/// Packages a finished (or failed) run into its persisted artifact.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportAssembler;

impl ReportAssembler {
    pub fn assemble(
        &self,
        state: WorkflowState,
        outcome: Result<(), WorkflowError>,
    ) -> DecisionReport {
        let finished_at = Utc::now();
        let elapsed_ms = (finished_at - state.started_at).num_milliseconds().max(0) as u64;
        let (status, failure) = match outcome {
            Ok(()) => (RunStatus::Completed, None),
            Err(e) => (RunStatus::RunFailed, Some(e.to_string())),
        };

        match &failure {
            None => info!(
                run_id = %state.run_id,
                symbol = %state.symbol,
                elapsed_ms,
                "Run completed"
            ),
            Some(reason) => error!(
                run_id = %state.run_id,
                symbol = %state.symbol,
                elapsed_ms,
                error = %reason,
                "Run failed"
            ),
        }

        DecisionReport {
            id: state.run_id,
            schema_version: REPORT_SCHEMA_VERSION,
            symbol: state.symbol.clone(),
            market_type: state.market_type,
            status,
            started_at: state.started_at,
            finished_at,
            elapsed_ms,
            failure,
            trace: state,
        }
    }

    pub fn render(&self, report: &DecisionReport, pretty: bool) -> Result<String, serde_json::Error> {
        if pretty {
            serde_json::to_string_pretty(report)
        } else {
            serde_json::to_string(report)
        }
    }
}
