use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::SecondsFormat;
use quorum_models::{DecisionReport, StoreConfig};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::memory::MemoryCache;
use crate::sqlite::{ReportRow, SqliteStore};

/// Durable report storage: writes go to SQLite and the moka hot cache,
/// reads check moka first and promote SQLite hits.
///
/// SQLite access is synchronized via `Mutex` since `rusqlite::Connection`
/// is not `Sync`.
pub struct ReportStore {
    memory: MemoryCache,
    sqlite: Mutex<SqliteStore>,
}

impl ReportStore {
    pub fn new(sqlite: SqliteStore, max_capacity: u64, memory_ttl: Duration) -> Self {
        Self {
            memory: MemoryCache::new(max_capacity, memory_ttl),
            sqlite: Mutex::new(sqlite),
        }
    }

    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let sqlite = SqliteStore::open(&config.sqlite_path)?;
        info!(path = %config.sqlite_path, "Report store opened");
        Ok(Self::new(
            sqlite,
            config.memory_max_capacity,
            Duration::from_secs(config.memory_ttl_seconds),
        ))
    }

    fn sqlite(&self) -> Result<MutexGuard<'_, SqliteStore>, StoreError> {
        self.sqlite
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }

    pub async fn save(&self, report: &DecisionReport) -> Result<(), StoreError> {
        let row = ReportRow {
            id: report.id.to_string(),
            symbol: report.symbol.clone(),
            market_type: report.market_type.as_str().to_string(),
            status: report.status.as_str().to_string(),
            created_at: report
                .finished_at
                .to_rfc3339_opts(SecondsFormat::Micros, true),
            report_json: serde_json::to_string(report)?,
        };
        self.sqlite()?.insert(&row)?;
        self.memory.insert(Arc::new(report.clone())).await;
        debug!(id = %report.id, symbol = %report.symbol, "Report saved");
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Arc<DecisionReport>>, StoreError> {
        if let Some(report) = self.memory.get(&id).await {
            return Ok(Some(report));
        }

        let row = self.sqlite()?.get(&id.to_string())?;
        match row {
            Some(row) => {
                let report = Arc::new(serde_json::from_str::<DecisionReport>(&row.report_json)?);
                self.memory.insert(Arc::clone(&report)).await;
                Ok(Some(report))
            }
            None => Ok(None),
        }
    }

    /// Newest first, straight from SQLite.
    pub fn recent_for_symbol(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<DecisionReport>, StoreError> {
        let rows = self.sqlite()?.recent_for_symbol(symbol, limit)?;
        rows.iter()
            .map(|row| serde_json::from_str(&row.report_json).map_err(StoreError::from))
            .collect()
    }
}
