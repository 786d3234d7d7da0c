//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use chrono::NaiveDate;
use tally_core::db::Database;
use tally_core::models::{FraudAlertType, FraudSeverity, NewTransaction};

use crate::commands::{self, truncate};

fn setup_test_db() -> Database {
    let db = Database::in_memory().unwrap();
    db.seed_defaults().unwrap();
    db
}

/// Create a test account and transaction, returning (account_id, tx_id)
fn create_test_transaction(db: &Database, description: &str, amount: f64) -> (i64, i64) {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let account_id = db
        .create_account("Test Checking", "Test Bank", None, None, None, None)
        .unwrap();
    let hash = format!(
        "hash_{}_{}",
        description,
        COUNTER.fetch_add(1, Ordering::SeqCst)
    );
    let tx_id = db
        .insert_transaction(
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
                import_hash: hash,
                original_data: None,
            },
        )
        .unwrap();
    (account_id, tx_id)
}

// ========== Category Command Tests ==========

#[test]
fn test_cmd_categories_list() {
    let db = setup_test_db();
    assert!(commands::cmd_categories_list(&db).is_ok());
}

#[test]
fn test_cmd_categories_add() {
    let db = setup_test_db();
    let result = commands::cmd_categories_add(&db, "Hobby");
    assert!(result.is_ok());

    let category = db.get_category_by_name("Hobby").unwrap();
    assert!(category.is_some());
}

#[test]
fn test_cmd_categories_add_duplicate() {
    let db = setup_test_db();
    commands::cmd_categories_add(&db, "Hobby").unwrap();

    let result = commands::cmd_categories_add(&db, "Hobby");
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("already exists"));
}

#[test]
fn test_cmd_categories_add_empty_name() {
    let db = setup_test_db();
    let result = commands::cmd_categories_add(&db, "   ");
    assert!(result.is_err());
}

#[test]
fn test_cmd_categories_delete() {
    let db = setup_test_db();
    commands::cmd_categories_add(&db, "Temp").unwrap();
    let category = db.get_category_by_name("Temp").unwrap().unwrap();

    let result = commands::cmd_categories_delete(&db, category.id);
    assert!(result.is_ok());
    assert!(db.get_category_by_name("Temp").unwrap().is_none());
}

#[test]
fn test_cmd_categories_delete_fallback_refused() {
    let db = setup_test_db();
    let uncategorized = db
        .get_category_by_name(tally_core::categorize::FALLBACK_CATEGORY)
        .unwrap()
        .unwrap();

    let result = commands::cmd_categories_delete(&db, uncategorized.id);
    assert!(result.is_err());
}

// ========== Rule Command Tests ==========

#[test]
fn test_cmd_rules_add() {
    let db = setup_test_db();
    let result = commands::cmd_rules_add(&db, "Dining", "COFFEE|CAFE", "regex", 5);
    assert!(result.is_ok());

    let rules = db.list_category_rules().unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].pattern, "COFFEE|CAFE");
    assert_eq!(rules[0].priority, 5);
}

#[test]
fn test_cmd_rules_add_unknown_category() {
    let db = setup_test_db();
    let result = commands::cmd_rules_add(&db, "NoSuchCategory", "PATTERN", "contains", 0);
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("not found"));
}

#[test]
fn test_cmd_rules_add_invalid_regex() {
    let db = setup_test_db();
    let result = commands::cmd_rules_add(&db, "Dining", "([", "regex", 0);
    assert!(result.is_err());
}

#[test]
fn test_cmd_rules_add_invalid_pattern_type() {
    let db = setup_test_db();
    let result = commands::cmd_rules_add(&db, "Dining", "CAFE", "fuzzy", 0);
    assert!(result.is_err());
}

#[test]
fn test_cmd_rules_delete() {
    let db = setup_test_db();
    commands::cmd_rules_add(&db, "Dining", "CAFE", "contains", 0).unwrap();
    let rule_id = db.list_category_rules().unwrap()[0].id;

    assert!(commands::cmd_rules_delete(&db, rule_id).is_ok());
    assert!(db.list_category_rules().unwrap().is_empty());
}

// ========== Merchant Pattern Command Tests ==========

#[test]
fn test_cmd_patterns_add_and_delete() {
    let db = setup_test_db();
    let before = db.list_merchant_patterns().unwrap().len();

    commands::cmd_patterns_add(&db, "local farm", "Groceries").unwrap();
    let patterns = db.list_merchant_patterns().unwrap();
    assert_eq!(patterns.len(), before + 1);

    let added = patterns
        .iter()
        .find(|p| p.keyword == "LOCAL FARM")
        .unwrap();
    assert!(commands::cmd_patterns_delete(&db, added.id).is_ok());
    assert_eq!(db.list_merchant_patterns().unwrap().len(), before);
}

#[test]
fn test_cmd_patterns_add_unknown_category() {
    let db = setup_test_db();
    let result = commands::cmd_patterns_add(&db, "keyword", "NoSuchCategory");
    assert!(result.is_err());
}

// ========== Transaction Command Tests ==========

#[test]
fn test_cmd_transactions_list_empty() {
    let db = setup_test_db();
    assert!(commands::cmd_transactions_list(&db, 20, None, false, None).is_ok());
}

#[test]
fn test_cmd_transactions_set_category() {
    let db = setup_test_db();
    let (_, tx_id) = create_test_transaction(&db, "MYSTERY VENDOR", -42.0);

    let result = commands::cmd_transactions_set_category(&db, tx_id, "Shopping", false);
    assert!(result.is_ok());

    let tx = db.get_transaction(tx_id).unwrap();
    assert_eq!(tx.category_name.as_deref(), Some("Shopping"));
    assert!(!tx.needs_review);
}

#[test]
fn test_cmd_transactions_set_category_creates_rule() {
    let db = setup_test_db();
    let (_, tx_id) = create_test_transaction(&db, "MYSTERY VENDOR", -42.0);

    commands::cmd_transactions_set_category(&db, tx_id, "Shopping", true).unwrap();

    let rules = db.list_category_rules().unwrap();
    assert!(rules.iter().any(|r| r.pattern == "MYSTERY VENDOR"));
}

#[test]
fn test_cmd_transactions_set_category_unknown_category() {
    let db = setup_test_db();
    let (_, tx_id) = create_test_transaction(&db, "SOMETHING", -10.0);

    let result = commands::cmd_transactions_set_category(&db, tx_id, "NoSuchCategory", false);
    assert!(result.is_err());
}

#[test]
fn test_cmd_transactions_review() {
    let db = setup_test_db();
    let (_, tx_id) = create_test_transaction(&db, "LOW CONFIDENCE", -10.0);

    assert!(commands::cmd_transactions_review(&db, tx_id).is_ok());
    assert!(commands::cmd_transactions_review(&db, 9999).is_err());
}

// ========== Budget Command Tests ==========

#[test]
fn test_cmd_budgets_add_and_list() {
    let db = setup_test_db();
    let from = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let to = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();

    let result = commands::cmd_budgets_add(&db, "Groceries", 400.0, from, to, 80.0);
    assert!(result.is_ok());

    let budgets = db.list_budgets().unwrap();
    assert_eq!(budgets.len(), 1);
    assert_eq!(budgets[0].limit_amount, 400.0);

    assert!(commands::cmd_budgets_list(&db).is_ok());
}

#[test]
fn test_cmd_budgets_add_unknown_category() {
    let db = setup_test_db();
    let from = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let to = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();

    let result = commands::cmd_budgets_add(&db, "NoSuchCategory", 400.0, from, to, 80.0);
    assert!(result.is_err());
}

#[test]
fn test_cmd_budgets_delete_unknown() {
    let db = setup_test_db();
    let result = commands::cmd_budgets_delete(&db, 9999);
    assert!(result.is_err());
}

// ========== Alert Command Tests ==========

#[test]
fn test_cmd_alerts_empty() {
    let db = setup_test_db();
    assert!(commands::cmd_alerts(&db, false).is_ok());
    assert!(commands::cmd_alerts(&db, true).is_ok());
}

#[test]
fn test_cmd_review_alert() {
    let db = setup_test_db();
    let (_, tx_id) = create_test_transaction(&db, "SUSPICIOUS CHARGE", -900.0);
    let alert_id = db
        .create_fraud_alert(
            tx_id,
            FraudAlertType::UnusualAmount,
            FraudSeverity::High,
            "Amount far above account baseline",
        )
        .unwrap()
        .unwrap();

    let result = commands::cmd_review(&db, alert_id, true, Some("known purchase"));
    assert!(result.is_ok());

    let alert = db.get_fraud_alert(alert_id).unwrap();
    assert!(alert.reviewed);
    assert!(alert.false_positive);

    assert!(commands::cmd_alerts(&db, true).is_ok());
}

#[test]
fn test_cmd_review_unknown_alert() {
    let db = setup_test_db();
    let result = commands::cmd_review(&db, 9999, false, None);
    assert!(result.is_err());
}

// ========== Export Command Tests ==========

#[test]
fn test_cmd_export_transactions() {
    let db = setup_test_db();
    create_test_transaction(&db, "NETFLIX.COM", -15.99);

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("transactions.csv");

    let result = commands::cmd_export(&db, &out, false);
    assert!(result.is_ok());

    let csv = std::fs::read_to_string(&out).unwrap();
    assert!(csv.contains("NETFLIX.COM"));
}

#[test]
fn test_cmd_export_budgets() {
    let db = setup_test_db();
    let from = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let to = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
    commands::cmd_budgets_add(&db, "Groceries", 400.0, from, to, 80.0).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("budgets.csv");

    let result = commands::cmd_export(&db, &out, true);
    assert!(result.is_ok());

    let csv = std::fs::read_to_string(&out).unwrap();
    assert!(csv.contains("Groceries"));
}

// ========== Account Command Tests ==========

#[test]
fn test_cmd_accounts_list_empty() {
    let db = setup_test_db();
    assert!(commands::cmd_accounts_list(&db, false).is_ok());
}

#[test]
fn test_cmd_accounts_unlink() {
    let db = setup_test_db();
    let (account_id, _) = create_test_transaction(&db, "TX", -10.0);

    assert!(commands::cmd_accounts_unlink(&db, account_id).is_ok());
    assert!(commands::cmd_accounts_unlink(&db, 9999).is_err());
}

// ========== Utility Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("exactly ten", 11), "exactly ten");
    assert_eq!(truncate("this is far too long", 10), "this is...");
}

#[test]
fn test_truncate_multibyte_descriptions() {
    // Cut points must land on char boundaries, not byte offsets
    assert_eq!(truncate("CAFÉ RENÉ PÂTISSERIE PARIS", 10), "CAFÉ RE...");
    assert_eq!(truncate("北京烤鸭店 BEIJING DUCK HOUSE", 8), "北京烤鸭店...");
    assert_eq!(truncate("CAFÉ", 10), "CAFÉ");
}
