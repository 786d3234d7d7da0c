//! Transaction CRUD and filtering

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, OptionalExtension, Row};
use std::str::FromStr;

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{CategorySource, DashboardStats, NewTransaction, Transaction};

fn row_to_transaction(row: &Row) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        account_id: row.get(1)?,
        provider_txn_id: row.get(2)?,
        date: row
            .get::<_, String>(3)?
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e)))?,
        posted_at: row
            .get::<_, Option<String>>(4)?
            .and_then(|s| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S").ok()),
        description: row.get(5)?,
        merchant: row.get(6)?,
        amount: row.get(7)?,
        location: row.get(8)?,
        pending: row.get(9)?,
        category_id: row.get(10)?,
        category_source: row
            .get::<_, Option<String>>(11)?
            .and_then(|s| CategorySource::from_str(&s).ok()),
        category_confidence: row.get(12)?,
        needs_review: row.get(13)?,
        import_hash: row.get(14)?,
        created_at: parse_datetime(&row.get::<_, String>(15)?),
        category_name: row.get(16)?,
    })
}

const TXN_SELECT: &str = r#"
    SELECT t.id, t.account_id, t.provider_txn_id, t.date, t.posted_at, t.description,
           t.merchant, t.amount, t.location, t.pending, t.category_id, t.category_source,
           t.category_confidence, t.needs_review, t.import_hash, t.created_at,
           c.name AS category_name
    FROM transactions t
    LEFT JOIN categories c ON c.id = t.category_id
"#;

/// Filter options for listing transactions
///
/// Shared by the API transaction list and CSV export.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub account_id: Option<i64>,
    pub category_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub pending: Option<bool>,
    pub needs_review: Option<bool>,
    /// Case-insensitive substring match on description or merchant
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl TransactionFilter {
    fn where_clause(&self, params_vec: &mut Vec<Box<dyn rusqlite::ToSql>>) -> String {
        let mut sql = String::from(" WHERE 1=1");

        if let Some(account_id) = self.account_id {
            sql.push_str(&format!(" AND t.account_id = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(account_id));
        }
        if let Some(category_id) = self.category_id {
            sql.push_str(&format!(" AND t.category_id = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(category_id));
        }
        if let Some(from) = &self.from {
            sql.push_str(&format!(" AND t.date >= ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(from.to_string()));
        }
        if let Some(to) = &self.to {
            sql.push_str(&format!(" AND t.date <= ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(to.to_string()));
        }
        if let Some(pending) = self.pending {
            sql.push_str(&format!(" AND t.pending = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(pending));
        }
        if let Some(needs_review) = self.needs_review {
            sql.push_str(&format!(" AND t.needs_review = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(needs_review));
        }
        if let Some(search) = &self.search {
            sql.push_str(&format!(
                " AND (t.description LIKE ?{} OR t.merchant LIKE ?{})",
                params_vec.len() + 1,
                params_vec.len() + 1
            ));
            params_vec.push(Box::new(format!("%{}%", search)));
        }

        sql
    }
}

impl Database {
    /// Insert a new transaction, returning its id
    ///
    /// Fails on a duplicate import_hash; callers dedupe first via
    /// `find_transaction_by_hash`.
    pub fn insert_transaction(&self, account_id: i64, tx: &NewTransaction) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO transactions
                (account_id, provider_txn_id, date, posted_at, description, merchant,
                 amount, location, pending, import_hash, original_data)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                account_id,
                tx.provider_txn_id,
                tx.date.to_string(),
                tx.posted_at.map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string()),
                tx.description,
                tx.merchant,
                tx.amount,
                tx.location,
                tx.pending,
                tx.import_hash,
                tx.original_data,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Look up a transaction by import hash, returning (id, pending) if present
    pub fn find_transaction_by_hash(&self, import_hash: &str) -> Result<Option<(i64, bool)>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, pending FROM transactions WHERE import_hash = ?1",
            params![import_hash],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(Into::into)
    }

    /// Look up a transaction by provider transaction id
    ///
    /// Used when a pending transaction posts with changed details; the hash
    /// no longer matches but the provider id does.
    pub fn find_transaction_by_provider_id(
        &self,
        account_id: i64,
        provider_txn_id: &str,
    ) -> Result<Option<(i64, bool)>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, pending FROM transactions WHERE account_id = ?1 AND provider_txn_id = ?2",
            params![account_id, provider_txn_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(Into::into)
    }

    /// Apply the posted details to a formerly pending transaction
    ///
    /// Amount and description routinely shift between authorization and
    /// posting; the import hash is refreshed so later syncs dedupe cleanly.
    pub fn post_pending_transaction(
        &self,
        id: i64,
        amount: f64,
        description: &str,
        posted_at: Option<NaiveDateTime>,
        import_hash: &str,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE transactions
            SET pending = 0,
                amount = ?1,
                description = ?2,
                posted_at = COALESCE(?3, posted_at),
                import_hash = ?4
            WHERE id = ?5
            "#,
            params![
                amount,
                description,
                posted_at.map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string()),
                import_hash,
                id
            ],
        )?;
        Ok(())
    }

    /// Get a transaction by id
    pub fn get_transaction(&self, id: i64) -> Result<Transaction> {
        let conn = self.conn()?;
        let sql = format!("{} WHERE t.id = ?1", TXN_SELECT);
        conn.query_row(&sql, params![id], row_to_transaction)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Transaction {} not found", id)))
    }

    /// List transactions matching a filter, newest first
    pub fn list_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;

        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![];
        let mut sql = format!("{}{}", TXN_SELECT, filter.where_clause(&mut params_vec));
        sql.push_str(" ORDER BY t.date DESC, t.id DESC");

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
            if let Some(offset) = filter.offset {
                sql.push_str(&format!(" OFFSET {}", offset));
            }
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), row_to_transaction)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Transactions awaiting categorization (or all, for a full re-run)
    pub fn list_transactions_for_backfill(&self, only_uncategorized: bool) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let sql = if only_uncategorized {
            format!(
                "{} WHERE t.category_id IS NULL ORDER BY t.date DESC, t.id DESC",
                TXN_SELECT
            )
        } else {
            format!("{} ORDER BY t.date DESC, t.id DESC", TXN_SELECT)
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_transaction)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Transition a pending transaction to posted
    pub fn mark_transaction_posted(&self, id: i64, posted_at: Option<NaiveDateTime>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE transactions SET pending = 0, posted_at = COALESCE(?1, posted_at) WHERE id = ?2",
            params![
                posted_at.map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string()),
                id
            ],
        )?;
        Ok(())
    }

    /// Store a category assignment on a transaction
    pub fn set_transaction_category(
        &self,
        id: i64,
        category_id: i64,
        source: CategorySource,
        confidence: i64,
        needs_review: bool,
    ) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE transactions
            SET category_id = ?1, category_source = ?2, category_confidence = ?3, needs_review = ?4
            WHERE id = ?5
            "#,
            params![category_id, source.as_str(), confidence, needs_review, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Transaction {} not found", id)));
        }
        Ok(())
    }

    /// Clear the manual-review flag on a transaction
    pub fn clear_needs_review(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE transactions SET needs_review = 0 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    /// Dashboard summary statistics
    pub fn get_dashboard_stats(&self) -> Result<DashboardStats> {
        let conn = self.conn()?;

        let account_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM accounts WHERE status != 'unlinked'",
            [],
            |row| row.get(0),
        )?;
        let transaction_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        let needs_review_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE needs_review = 1",
            [],
            |row| row.get(0),
        )?;
        let open_fraud_alerts: i64 = conn.query_row(
            "SELECT COUNT(*) FROM fraud_alerts WHERE reviewed = 0",
            [],
            |row| row.get(0),
        )?;
        let budgets_in_warning: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT budget_id) FROM budget_alerts WHERE resolved = 0",
            [],
            |row| row.get(0),
        )?;
        let last_sync_at: Option<String> = conn.query_row(
            "SELECT MAX(last_synced_at) FROM accounts",
            [],
            |row| row.get(0),
        )?;

        Ok(DashboardStats {
            account_count,
            transaction_count,
            needs_review_count,
            open_fraud_alerts,
            budgets_in_warning,
            last_sync_at: last_sync_at.map(|s| parse_datetime(&s)),
        })
    }
}
