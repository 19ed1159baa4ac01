use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::StoreError;

/// Schema for persisted decision reports. `report_json` holds the full
/// artifact; the other columns exist for lookup.
pub const REPORT_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS decision_reports (
    id TEXT PRIMARY KEY NOT NULL,
    symbol TEXT NOT NULL,
    market_type TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    report_json TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_decision_reports_symbol
    ON decision_reports (symbol, created_at);";

/// One row of `decision_reports`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub id: String,
    pub symbol: String,
    pub market_type: String,
    pub status: String,
    /// RFC 3339 with fixed microsecond precision, so text order is time order.
    pub created_at: String,
    pub report_json: String,
}

impl ReportRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            symbol: row.get(1)?,
            market_type: row.get(2)?,
            status: row.get(3)?,
            created_at: row.get(4)?,
            report_json: row.get(5)?,
        })
    }
}

/// SQLite table of decision reports.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(REPORT_TABLE_DDL)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(REPORT_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Insert or replace by id.
    pub fn insert(&self, row: &ReportRow) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO decision_reports \
             (id, symbol, market_type, status, created_at, report_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.id,
                row.symbol,
                row.market_type,
                row.status,
                row.created_at,
                row.report_json,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<ReportRow>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, symbol, market_type, status, created_at, report_json \
             FROM decision_reports WHERE id = ?1",
        )?;
        Ok(stmt.query_row(params![id], ReportRow::from_row).optional()?)
    }

    /// Newest first.
    pub fn recent_for_symbol(&self, symbol: &str, limit: usize) -> Result<Vec<ReportRow>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, symbol, market_type, status, created_at, report_json \
             FROM decision_reports WHERE symbol = ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![symbol, limit as i64], ReportRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM decision_reports", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, symbol: &str, created_at: &str) -> ReportRow {
        ReportRow {
            id: id.to_string(),
            symbol: symbol.to_string(),
            market_type: "futures".to_string(),
            status: "completed".to_string(),
            created_at: created_at.to_string(),
            report_json: format!(r#"{{"id": "{id}"}}"#),
        }
    }

    #[test]
    fn insert_and_get() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert(&row("a", "BTCUSDT", "2026-01-01T00:00:00.000000Z"))
            .unwrap();
        let found = store.get("a").unwrap().unwrap();
        assert_eq!(found.symbol, "BTCUSDT");
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn insert_replaces_same_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert(&row("a", "BTCUSDT", "2026-01-01T00:00:00.000000Z"))
            .unwrap();
        let mut updated = row("a", "BTCUSDT", "2026-01-01T00:00:00.000000Z");
        updated.status = "run_failed".to_string();
        store.insert(&updated).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get("a").unwrap().unwrap().status, "run_failed");
    }

    #[test]
    fn recent_for_symbol_is_newest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert(&row("old", "BTCUSDT", "2026-01-01T00:00:00.000000Z"))
            .unwrap();
        store
            .insert(&row("new", "BTCUSDT", "2026-01-02T00:00:00.000000Z"))
            .unwrap();
        store
            .insert(&row("eth", "ETHUSDT", "2026-01-03T00:00:00.000000Z"))
            .unwrap();

        let rows = store.recent_for_symbol("BTCUSDT", 10).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(store.recent_for_symbol("BTCUSDT", 1).unwrap().len(), 1);
    }
}
