//! Fraud alert storage and the aggregate queries behind the heuristics

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{FraudAlert, FraudAlertType, FraudSeverity};

fn row_to_fraud_alert(row: &Row) -> rusqlite::Result<FraudAlert> {
    Ok(FraudAlert {
        id: row.get(0)?,
        transaction_id: row.get(1)?,
        alert_type: row
            .get::<_, String>(2)?
            .parse()
            .unwrap_or(FraudAlertType::UnusualAmount),
        severity: row
            .get::<_, String>(3)?
            .parse()
            .unwrap_or(FraudSeverity::Medium),
        message: row.get(4)?,
        reviewed: row.get(5)?,
        false_positive: row.get(6)?,
        review_note: row.get(7)?,
        reviewed_at: row.get::<_, Option<String>>(8)?.map(|s| parse_datetime(&s)),
        created_at: parse_datetime(&row.get::<_, String>(9)?),
    })
}

const FRAUD_COLS: &str = "id, transaction_id, alert_type, severity, message, reviewed, \
                          false_positive, review_note, reviewed_at, created_at";

impl Database {
    /// Record a fraud alert, deduplicated per (transaction, type)
    ///
    /// An existing unreviewed alert of the same type for the same transaction
    /// suppresses the new one. Returns the alert id if one was created.
    pub fn create_fraud_alert(
        &self,
        transaction_id: i64,
        alert_type: FraudAlertType,
        severity: FraudSeverity,
        message: &str,
    ) -> Result<Option<i64>> {
        let conn = self.conn()?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM fraud_alerts WHERE transaction_id = ?1 AND alert_type = ?2 AND reviewed = 0",
                params![transaction_id, alert_type.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(None);
        }

        conn.execute(
            "INSERT INTO fraud_alerts (transaction_id, alert_type, severity, message) VALUES (?1, ?2, ?3, ?4)",
            params![transaction_id, alert_type.as_str(), severity.as_str(), message],
        )?;
        Ok(Some(conn.last_insert_rowid()))
    }

    /// List fraud alerts, newest first, optionally filtered by review state
    pub fn list_fraud_alerts(&self, reviewed: Option<bool>) -> Result<Vec<FraudAlert>> {
        let conn = self.conn()?;
        let (sql, has_param) = match reviewed {
            Some(_) => (
                format!(
                    "SELECT {} FROM fraud_alerts WHERE reviewed = ?1 ORDER BY created_at DESC, id DESC",
                    FRAUD_COLS
                ),
                true,
            ),
            None => (
                format!(
                    "SELECT {} FROM fraud_alerts ORDER BY created_at DESC, id DESC",
                    FRAUD_COLS
                ),
                false,
            ),
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = if has_param {
            stmt.query_map(params![reviewed], row_to_fraud_alert)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            stmt.query_map([], row_to_fraud_alert)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    /// Get a fraud alert by id
    pub fn get_fraud_alert(&self, id: i64) -> Result<FraudAlert> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM fraud_alerts WHERE id = ?1", FRAUD_COLS);
        conn.query_row(&sql, params![id], row_to_fraud_alert)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Fraud alert {} not found", id)))
    }

    /// Mark an alert reviewed, optionally as a false positive
    ///
    /// False-positive marking records state only; heuristic thresholds are
    /// static and unaffected.
    pub fn review_fraud_alert(
        &self,
        id: i64,
        false_positive: bool,
        note: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE fraud_alerts
            SET reviewed = 1, false_positive = ?1, review_note = ?2, reviewed_at = CURRENT_TIMESTAMP
            WHERE id = ?3
            "#,
            params![false_positive, note, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Fraud alert {} not found", id)));
        }
        Ok(())
    }

    /// Rolling expense baseline for an account: (mean absolute amount, count)
    ///
    /// Covers non-pending expenses in the trailing window ending at `as_of`,
    /// excluding the transaction under analysis.
    pub fn amount_baseline(
        &self,
        account_id: i64,
        as_of: NaiveDate,
        window_days: i64,
        exclude_txn_id: i64,
    ) -> Result<(f64, i64)> {
        let since = as_of - Duration::days(window_days);
        let conn = self.conn()?;
        conn.query_row(
            r#"
            SELECT COALESCE(AVG(ABS(amount)), 0), COUNT(*)
            FROM transactions
            WHERE account_id = ?1
              AND id != ?2
              AND pending = 0
              AND amount < 0
              AND date >= ?3
              AND date <= ?4
            "#,
            params![account_id, exclude_txn_id, since.to_string(), as_of.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(Into::into)
    }

    /// How many times a location appears for an account in the trailing window
    pub fn location_seen_count(
        &self,
        account_id: i64,
        location: &str,
        since: NaiveDate,
        exclude_txn_id: i64,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.query_row(
            r#"
            SELECT COUNT(*)
            FROM transactions
            WHERE account_id = ?1
              AND id != ?2
              AND location = ?3 COLLATE NOCASE
              AND date >= ?4
            "#,
            params![account_id, exclude_txn_id, location, since.to_string()],
            |row| row.get(0),
        )
        .map_err(Into::into)
    }

    /// Total located transactions for an account in the trailing window
    ///
    /// Used to skip the location check on accounts with no location history.
    pub fn located_transaction_count(
        &self,
        account_id: i64,
        since: NaiveDate,
        exclude_txn_id: i64,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.query_row(
            r#"
            SELECT COUNT(*)
            FROM transactions
            WHERE account_id = ?1
              AND id != ?2
              AND location IS NOT NULL
              AND date >= ?3
            "#,
            params![account_id, exclude_txn_id, since.to_string()],
            |row| row.get(0),
        )
        .map_err(Into::into)
    }

    /// Count transactions for an account in the trailing window ending at `end`
    ///
    /// Only transactions carrying a provider timestamp participate.
    pub fn velocity_count(
        &self,
        account_id: i64,
        end: NaiveDateTime,
        window_secs: i64,
        exclude_txn_id: i64,
    ) -> Result<i64> {
        let start = end - Duration::seconds(window_secs);
        let conn = self.conn()?;
        conn.query_row(
            r#"
            SELECT COUNT(*)
            FROM transactions
            WHERE account_id = ?1
              AND id != ?2
              AND posted_at IS NOT NULL
              AND posted_at > ?3
              AND posted_at <= ?4
            "#,
            params![
                account_id,
                exclude_txn_id,
                start.format("%Y-%m-%d %H:%M:%S").to_string(),
                end.format("%Y-%m-%d %H:%M:%S").to_string()
            ],
            |row| row.get(0),
        )
        .map_err(Into::into)
    }
}
