pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::StoreError;
pub use sqlite::{ReportRow, SqliteStore};
pub use store::ReportStore;

#[cfg(test)]
pub(crate) fn test_report(symbol: &str) -> quorum_models::DecisionReport {
    use chrono::Utc;
    use quorum_models::{
        DecisionReport, MarketDataPackage, MarketType, RunStatus, WorkflowState,
        REPORT_SCHEMA_VERSION,
    };

    let package: MarketDataPackage = serde_json::from_value(serde_json::json!({
        "symbol": symbol,
        "market_type": "futures",
        "captured_at": Utc::now(),
        "last_price": "50000",
    }))
    .unwrap();
    let trace = WorkflowState::new(&package, 2);
    DecisionReport {
        id: trace.run_id,
        schema_version: REPORT_SCHEMA_VERSION,
        symbol: symbol.to_string(),
        market_type: MarketType::Futures,
        status: RunStatus::Completed,
        started_at: trace.started_at,
        finished_at: Utc::now(),
        elapsed_ms: 0,
        failure: None,
        trace,
    }
}
