//! Budget storage, spend aggregation, and budget alerts

use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Budget, BudgetAlert, BudgetStatus, NewBudget};

fn row_to_budget(row: &Row) -> rusqlite::Result<Budget> {
    Ok(Budget {
        id: row.get(0)?,
        category_id: row.get(1)?,
        limit_amount: row.get(2)?,
        start_date: row
            .get::<_, String>(3)?
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e)))?,
        end_date: row
            .get::<_, String>(4)?
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e)))?,
        alert_threshold_pct: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

const BUDGET_COLS: &str =
    "id, category_id, limit_amount, start_date, end_date, alert_threshold_pct, created_at";

impl Database {
    /// Create a budget, returning its id
    pub fn create_budget(&self, budget: &NewBudget) -> Result<i64> {
        if budget.end_date < budget.start_date {
            return Err(Error::InvalidData(
                "Budget end_date must not precede start_date".into(),
            ));
        }
        if budget.limit_amount < 0.0 {
            return Err(Error::InvalidData("Budget limit must be non-negative".into()));
        }

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO budgets (category_id, limit_amount, start_date, end_date, alert_threshold_pct)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                budget.category_id,
                budget.limit_amount,
                budget.start_date.to_string(),
                budget.end_date.to_string(),
                budget.alert_threshold_pct,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List all budgets
    pub fn list_budgets(&self) -> Result<Vec<Budget>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM budgets ORDER BY start_date DESC, id", BUDGET_COLS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_budget)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Budgets whose category matches one of the given ids
    pub fn list_budgets_for_categories(&self, category_ids: &[i64]) -> Result<Vec<Budget>> {
        if category_ids.is_empty() {
            return Ok(vec![]);
        }
        let conn = self.conn()?;
        let placeholders: Vec<String> =
            (1..=category_ids.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "SELECT {} FROM budgets WHERE category_id IN ({}) ORDER BY id",
            BUDGET_COLS,
            placeholders.join(",")
        );
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            category_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), row_to_budget)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Get a budget by id
    pub fn get_budget(&self, id: i64) -> Result<Budget> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM budgets WHERE id = ?1", BUDGET_COLS);
        conn.query_row(&sql, params![id], row_to_budget)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Budget {} not found", id)))
    }

    /// Update a budget's limit, dates, and threshold
    pub fn update_budget(&self, id: i64, budget: &NewBudget) -> Result<()> {
        if budget.end_date < budget.start_date {
            return Err(Error::InvalidData(
                "Budget end_date must not precede start_date".into(),
            ));
        }
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE budgets
            SET category_id = ?1, limit_amount = ?2, start_date = ?3, end_date = ?4, alert_threshold_pct = ?5
            WHERE id = ?6
            "#,
            params![
                budget.category_id,
                budget.limit_amount,
                budget.start_date.to_string(),
                budget.end_date.to_string(),
                budget.alert_threshold_pct,
                id,
            ],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Budget {} not found", id)));
        }
        Ok(())
    }

    /// Delete a budget (alerts cascade)
    pub fn delete_budget(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM budgets WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("Budget {} not found", id)));
        }
        Ok(())
    }

    /// Sum of non-pending expense amounts in the budget's category and window
    ///
    /// Pending transactions never count toward budget spend.
    pub fn budget_spent(&self, budget: &Budget) -> Result<f64> {
        let conn = self.conn()?;
        let spent: f64 = conn.query_row(
            r#"
            SELECT COALESCE(SUM(ABS(amount)), 0)
            FROM transactions
            WHERE category_id = ?1
              AND pending = 0
              AND amount < 0
              AND date >= ?2
              AND date <= ?3
            "#,
            params![
                budget.category_id,
                budget.start_date.to_string(),
                budget.end_date.to_string()
            ],
            |row| row.get(0),
        )?;
        Ok(spent)
    }

    /// Raise a budget alert unless an unresolved alert of the same level exists
    ///
    /// Returns the alert id if one was created.
    pub fn create_budget_alert(
        &self,
        budget_id: i64,
        level: BudgetStatus,
        message: &str,
    ) -> Result<Option<i64>> {
        let conn = self.conn()?;

        // Dedupe: an open alert at this level suppresses a new one
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM budget_alerts WHERE budget_id = ?1 AND level = ?2 AND resolved = 0",
                params![budget_id, level.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(None);
        }

        conn.execute(
            "INSERT INTO budget_alerts (budget_id, level, message) VALUES (?1, ?2, ?3)",
            params![budget_id, level.as_str(), message],
        )?;
        Ok(Some(conn.last_insert_rowid()))
    }

    /// List budget alerts, optionally including resolved ones
    pub fn list_budget_alerts(&self, include_resolved: bool) -> Result<Vec<BudgetAlert>> {
        let conn = self.conn()?;
        let sql = if include_resolved {
            "SELECT id, budget_id, level, message, resolved, created_at FROM budget_alerts ORDER BY created_at DESC"
        } else {
            "SELECT id, budget_id, level, message, resolved, created_at FROM budget_alerts WHERE resolved = 0 ORDER BY created_at DESC"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(BudgetAlert {
                id: row.get(0)?,
                budget_id: row.get(1)?,
                level: row
                    .get::<_, String>(2)?
                    .parse()
                    .unwrap_or(BudgetStatus::Warning),
                message: row.get(3)?,
                resolved: row.get(4)?,
                created_at: parse_datetime(&row.get::<_, String>(5)?),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Resolve all open alerts for a budget (e.g. after the limit is raised)
    pub fn resolve_budget_alerts(&self, budget_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE budget_alerts SET resolved = 1 WHERE budget_id = ?1",
            params![budget_id],
        )?;
        Ok(())
    }
}
