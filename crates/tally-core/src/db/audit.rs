//! Audit log of mutating operations

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::AuditEntry;

impl Database {
    /// Append an audit log entry
    pub fn log_audit(
        &self,
        user: &str,
        action: &str,
        target_type: Option<&str>,
        target_id: Option<i64>,
        detail: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO audit_log (user, action, target_type, target_id, detail) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user, action, target_type, target_id, detail],
        )?;
        Ok(())
    }

    /// Recent audit entries, newest first
    pub fn list_audit_log(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user, action, target_type, target_id, detail, created_at
             FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(AuditEntry {
                id: row.get(0)?,
                user: row.get(1)?,
                action: row.get(2)?,
                target_type: row.get(3)?,
                target_id: row.get(4)?,
                detail: row.get(5)?,
                created_at: parse_datetime(&row.get::<_, String>(6)?),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}
