//! CSV export

use crate::budget::list_budget_progress;
use crate::db::{Database, TransactionFilter};
use crate::error::{Error, Result};

/// Export transactions matching a filter as CSV
///
/// Columns mirror what the transactions API returns; access tokens and raw
/// provider payloads are never exported.
pub fn transactions_to_csv(db: &Database, filter: &TransactionFilter) -> Result<String> {
    let transactions = db.list_transactions(filter)?;

    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "id",
        "account_id",
        "date",
        "description",
        "merchant",
        "amount",
        "location",
        "pending",
        "category",
        "category_source",
        "category_confidence",
        "needs_review",
    ])?;

    for tx in &transactions {
        writer.write_record([
            tx.id.to_string(),
            tx.account_id.to_string(),
            tx.date.to_string(),
            tx.description.clone(),
            tx.merchant.clone().unwrap_or_default(),
            format!("{:.2}", tx.amount),
            tx.location.clone().unwrap_or_default(),
            tx.pending.to_string(),
            tx.category_name.clone().unwrap_or_default(),
            tx.category_source.map(|s| s.to_string()).unwrap_or_default(),
            tx.category_confidence
                .map(|c| c.to_string())
                .unwrap_or_default(),
            tx.needs_review.to_string(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::InvalidData(format!("CSV write failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::InvalidData(format!("CSV not UTF-8: {}", e)))
}

/// Export all budgets with their current progress as CSV
pub fn budgets_to_csv(db: &Database) -> Result<String> {
    let progress = list_budget_progress(db)?;

    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "budget_id",
        "category",
        "start_date",
        "end_date",
        "limit",
        "spent",
        "remaining",
        "percent_used",
        "status",
    ])?;

    for p in &progress {
        writer.write_record([
            p.budget_id.to_string(),
            p.category_name.clone(),
            p.start_date.to_string(),
            p.end_date.to_string(),
            format!("{:.2}", p.limit_amount),
            format!("{:.2}", p.spent),
            format!("{:.2}", p.remaining),
            format!("{:.1}", p.percent_used),
            p.status.to_string(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::InvalidData(format!("CSV write failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::InvalidData(format!("CSV not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewTransaction;
    use chrono::NaiveDate;

    fn setup_db() -> (Database, i64) {
        let db = Database::in_memory().unwrap();
        db.seed_defaults().unwrap();
        let account_id = db
            .create_account("Checking", "Test Bank", None, None, None, None)
            .unwrap();
        (db, account_id)
    }

    fn insert(db: &Database, account_id: i64, description: &str, amount: f64, hash: &str) {
        db.insert_transaction(
            account_id,
            &NewTransaction {
                provider_txn_id: None,
                date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                posted_at: None,
                description: description.to_string(),
                merchant: None,
                amount,
                location: None,
                pending: false,
                import_hash: hash.to_string(),
                original_data: None,
            },
        )
        .unwrap();
    }

    #[test]
    fn test_transactions_csv() {
        let (db, account_id) = setup_db();
        insert(&db, account_id, "COFFEE SHOP", -4.50, "h1");
        insert(&db, account_id, "Comma, Inc \"quoted\"", -10.00, "h2");

        let csv = transactions_to_csv(&db, &TransactionFilter::default()).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("id,account_id,date"));
        assert_eq!(lines.count(), 2);
        // Fields with commas and quotes come out escaped
        assert!(csv.contains("\"Comma, Inc \"\"quoted\"\"\""));
        assert!(csv.contains("-4.50"));
    }

    #[test]
    fn test_transactions_csv_respects_filter() {
        let (db, account_id) = setup_db();
        insert(&db, account_id, "COFFEE SHOP", -4.50, "h1");
        insert(&db, account_id, "GROCERY RUN", -60.00, "h2");

        let filter = TransactionFilter {
            search: Some("coffee".to_string()),
            ..Default::default()
        };
        let csv = transactions_to_csv(&db, &filter).unwrap();
        assert!(csv.contains("COFFEE SHOP"));
        assert!(!csv.contains("GROCERY RUN"));
    }

    #[test]
    fn test_budgets_csv() {
        let (db, _) = setup_db();
        let dining = db.get_category_by_name("Dining").unwrap().unwrap();
        db.create_budget(&crate::models::NewBudget {
            category_id: dining.id,
            limit_amount: 200.0,
            start_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            alert_threshold_pct: 80.0,
        })
        .unwrap();

        let csv = budgets_to_csv(&db).unwrap();
        assert!(csv.starts_with("budget_id,category"));
        assert!(csv.contains("Dining"));
        assert!(csv.contains("200.00"));
        assert!(csv.contains(",ok"));
    }
}
