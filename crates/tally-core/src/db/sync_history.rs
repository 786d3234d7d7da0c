//! Per-account sync run records

use rusqlite::{params, Row};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{SyncRecord, SyncStatus};

fn row_to_record(row: &Row) -> rusqlite::Result<SyncRecord> {
    Ok(SyncRecord {
        id: row.get(0)?,
        account_id: row.get(1)?,
        status: row
            .get::<_, String>(2)?
            .parse()
            .unwrap_or(SyncStatus::Failed),
        fetched: row.get(3)?,
        imported: row.get(4)?,
        updated: row.get(5)?,
        error: row.get(6)?,
        started_at: parse_datetime(&row.get::<_, String>(7)?),
        finished_at: row.get::<_, Option<String>>(8)?.map(|s| parse_datetime(&s)),
    })
}

impl Database {
    /// Record the outcome of a sync run
    pub fn record_sync(
        &self,
        account_id: i64,
        status: SyncStatus,
        fetched: i64,
        imported: i64,
        updated: i64,
        error: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO sync_history (account_id, status, fetched, imported, updated, error, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, CURRENT_TIMESTAMP)
            "#,
            params![account_id, status.as_str(), fetched, imported, updated, error],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Recent sync runs, newest first
    pub fn list_sync_history(&self, account_id: Option<i64>, limit: i64) -> Result<Vec<SyncRecord>> {
        let conn = self.conn()?;
        let base = "SELECT id, account_id, status, fetched, imported, updated, error, started_at, finished_at FROM sync_history";

        let rows = match account_id {
            Some(id) => {
                let sql = format!("{} WHERE account_id = ?1 ORDER BY id DESC LIMIT ?2", base);
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![id, limit], row_to_record)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let sql = format!("{} ORDER BY id DESC LIMIT ?1", base);
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![limit], row_to_record)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }
}
