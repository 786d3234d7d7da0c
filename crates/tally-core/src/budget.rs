//! Budget progress calculation and threshold alerts

use serde::Serialize;
use tracing::info;

use crate::db::Database;
use crate::error::Result;
use crate::models::{Budget, BudgetStatus};

/// A budget with its computed progress
#[derive(Debug, Clone, Serialize)]
pub struct BudgetProgress {
    pub budget_id: i64,
    pub category_id: i64,
    pub category_name: String,
    pub limit_amount: f64,
    pub start_date: chrono::NaiveDate,
    pub end_date: chrono::NaiveDate,
    pub alert_threshold_pct: f64,
    pub spent: f64,
    /// May go negative when the budget is exceeded
    pub remaining: f64,
    pub percent_used: f64,
    pub status: BudgetStatus,
}

/// Status for a percent-used value relative to the alert threshold
pub fn progress_status(percent_used: f64, alert_threshold_pct: f64) -> BudgetStatus {
    if percent_used >= 100.0 {
        BudgetStatus::Exceeded
    } else if percent_used >= alert_threshold_pct {
        BudgetStatus::Warning
    } else {
        BudgetStatus::Ok
    }
}

/// Compute progress for one budget
pub fn budget_progress(db: &Database, budget: &Budget) -> Result<BudgetProgress> {
    let spent = db.budget_spent(budget)?;
    let percent_used = if budget.limit_amount > 0.0 {
        spent / budget.limit_amount * 100.0
    } else {
        0.0
    };
    let category = db.get_category(budget.category_id)?;

    Ok(BudgetProgress {
        budget_id: budget.id,
        category_id: budget.category_id,
        category_name: category.name,
        limit_amount: budget.limit_amount,
        start_date: budget.start_date,
        end_date: budget.end_date,
        alert_threshold_pct: budget.alert_threshold_pct,
        spent,
        remaining: budget.limit_amount - spent,
        percent_used,
        status: progress_status(percent_used, budget.alert_threshold_pct),
    })
}

/// Compute progress for all budgets
pub fn list_budget_progress(db: &Database) -> Result<Vec<BudgetProgress>> {
    db.list_budgets()?
        .iter()
        .map(|b| budget_progress(db, b))
        .collect()
}

/// Raise threshold alerts for budgets in the given categories
///
/// Called after a sync touches transactions in those categories. Warning and
/// exceeded alerts are deduplicated per budget per level; a budget back under
/// its threshold has its open alerts resolved.
pub fn evaluate_budget_alerts(db: &Database, category_ids: &[i64]) -> Result<Vec<i64>> {
    let mut created = Vec::new();

    for budget in db.list_budgets_for_categories(category_ids)? {
        let progress = budget_progress(db, &budget)?;
        match progress.status {
            BudgetStatus::Exceeded => {
                let message = format!(
                    "{} budget exceeded: spent {:.2} of {:.2} ({:.0}%)",
                    progress.category_name,
                    progress.spent,
                    progress.limit_amount,
                    progress.percent_used
                );
                if let Some(id) = db.create_budget_alert(budget.id, BudgetStatus::Exceeded, &message)? {
                    info!(budget_id = budget.id, "Budget exceeded alert raised");
                    created.push(id);
                }
            }
            BudgetStatus::Warning => {
                let message = format!(
                    "{} budget at {:.0}% of {:.2} limit (threshold {:.0}%)",
                    progress.category_name,
                    progress.percent_used,
                    progress.limit_amount,
                    progress.alert_threshold_pct
                );
                if let Some(id) = db.create_budget_alert(budget.id, BudgetStatus::Warning, &message)? {
                    info!(budget_id = budget.id, "Budget warning alert raised");
                    created.push(id);
                }
            }
            BudgetStatus::Ok => {
                db.resolve_budget_alerts(budget.id)?;
            }
        }
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewBudget, NewTransaction};
    use chrono::NaiveDate;

    fn setup_db() -> Database {
        let db = Database::in_memory().unwrap();
        db.seed_defaults().unwrap();
        db
    }

    fn insert_expense(
        db: &Database,
        account_id: i64,
        category: &str,
        date: NaiveDate,
        amount: f64,
        pending: bool,
        hash: &str,
    ) {
        let id = db
            .insert_transaction(
                account_id,
                &NewTransaction {
                    provider_txn_id: None,
                    date,
                    posted_at: None,
                    description: format!("tx {}", hash),
                    merchant: None,
                    amount,
                    location: None,
                    pending,
                    import_hash: hash.to_string(),
                    original_data: None,
                },
            )
            .unwrap();
        let cat = db.get_category_by_name(category).unwrap().unwrap();
        db.set_transaction_category(id, cat.id, crate::models::CategorySource::Manual, 100, false)
            .unwrap();
    }

    fn june_budget(db: &Database, category: &str, limit: f64, threshold: f64) -> Budget {
        let cat = db.get_category_by_name(category).unwrap().unwrap();
        let id = db
            .create_budget(&NewBudget {
                category_id: cat.id,
                limit_amount: limit,
                start_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
                alert_threshold_pct: threshold,
            })
            .unwrap();
        db.get_budget(id).unwrap()
    }

    #[test]
    fn test_progress_status_boundaries() {
        assert_eq!(progress_status(79.9, 80.0), BudgetStatus::Ok);
        assert_eq!(progress_status(80.0, 80.0), BudgetStatus::Warning);
        assert_eq!(progress_status(99.9, 80.0), BudgetStatus::Warning);
        assert_eq!(progress_status(100.0, 80.0), BudgetStatus::Exceeded);
        assert_eq!(progress_status(150.0, 80.0), BudgetStatus::Exceeded);
    }

    #[test]
    fn test_progress_ignores_pending_and_out_of_range() {
        let db = setup_db();
        let account_id = db
            .create_account("Checking", "Test Bank", None, None, None, None)
            .unwrap();
        let budget = june_budget(&db, "Dining", 200.0, 80.0);

        let june = |d| NaiveDate::from_ymd_opt(2024, 6, d).unwrap();
        insert_expense(&db, account_id, "Dining", june(5), -50.0, false, "h1");
        // Pending never counts
        insert_expense(&db, account_id, "Dining", june(6), -40.0, true, "h2");
        // Outside the window
        insert_expense(
            &db,
            account_id,
            "Dining",
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            -30.0,
            false,
            "h3",
        );
        // Credits never count
        insert_expense(&db, account_id, "Dining", june(7), 25.0, false, "h4");

        let progress = budget_progress(&db, &budget).unwrap();
        assert_eq!(progress.spent, 50.0);
        assert_eq!(progress.remaining, 150.0);
        assert_eq!(progress.status, BudgetStatus::Ok);
    }

    #[test]
    fn test_zero_limit_budget() {
        let db = setup_db();
        let budget = june_budget(&db, "Dining", 0.0, 80.0);
        let progress = budget_progress(&db, &budget).unwrap();
        assert_eq!(progress.percent_used, 0.0);
        assert_eq!(progress.status, BudgetStatus::Ok);
    }

    #[test]
    fn test_alert_raised_and_deduplicated() {
        let db = setup_db();
        let account_id = db
            .create_account("Checking", "Test Bank", None, None, None, None)
            .unwrap();
        let budget = june_budget(&db, "Dining", 100.0, 80.0);
        let june = |d| NaiveDate::from_ymd_opt(2024, 6, d).unwrap();
        insert_expense(&db, account_id, "Dining", june(5), -85.0, false, "h1");

        let created = evaluate_budget_alerts(&db, &[budget.category_id]).unwrap();
        assert_eq!(created.len(), 1);

        // Re-evaluating the same state raises nothing new
        let again = evaluate_budget_alerts(&db, &[budget.category_id]).unwrap();
        assert!(again.is_empty());

        let alerts = db.list_budget_alerts(false).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, BudgetStatus::Warning);
    }

    #[test]
    fn test_exceeded_alert() {
        let db = setup_db();
        let account_id = db
            .create_account("Checking", "Test Bank", None, None, None, None)
            .unwrap();
        let budget = june_budget(&db, "Groceries", 100.0, 80.0);
        insert_expense(
            &db,
            account_id,
            "Groceries",
            NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            -120.0,
            false,
            "h1",
        );

        evaluate_budget_alerts(&db, &[budget.category_id]).unwrap();
        let alerts = db.list_budget_alerts(false).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, BudgetStatus::Exceeded);

        let progress = budget_progress(&db, &budget).unwrap();
        assert!(progress.remaining < 0.0);
    }
}
