//! Integration tests for tally-core
//!
//! These tests exercise the full link → sync → categorize → alert workflow
//! against the mock aggregator.

use chrono::{NaiveDate, NaiveDateTime};
use tally_core::{
    aggregator::{AggregatorClient, MockAggregator, ProviderTransaction},
    budget::list_budget_progress,
    categorize::CategoryEngine,
    db::{Database, TransactionFilter},
    export::transactions_to_csv,
    fraud::FraudConfig,
    models::{BudgetStatus, CategorySource, FraudAlertType, NewBudget, PatternType},
    sync::SyncEngine,
    AIClient,
};

fn date(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, m, d).unwrap()
}

fn ts(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok()
}

fn provider_tx(id: &str, d: NaiveDate, description: &str, amount: f64) -> ProviderTransaction {
    ProviderTransaction {
        provider_txn_id: id.to_string(),
        date: d,
        posted_at: None,
        description: description.to_string(),
        merchant: None,
        amount,
        category: None,
        location: None,
        pending: false,
    }
}

fn month_of_spending() -> Vec<ProviderTransaction> {
    let mut txns = vec![
        provider_tx("t1", date(6, 1), "NETFLIX.COM 866-579-7172", -15.99),
        provider_tx("t2", date(6, 3), "WHOLE FOODS MARKET #102", -84.12),
        provider_tx("t3", date(6, 5), "STARBUCKS STORE 0517", -6.25),
        provider_tx("t4", date(6, 8), "UBER *TRIP", -23.40),
        provider_tx("t5", date(6, 12), "TRADER JOE'S #55", -52.80),
        provider_tx("t6", date(6, 15), "PAYROLL DEPOSIT", 2400.00),
    ];
    txns[5].category = Some("INCOME".to_string());
    txns
}

#[tokio::test]
async fn test_full_link_and_sync_workflow() {
    let db = Database::in_memory().unwrap();
    db.seed_defaults().unwrap();

    let mock = MockAggregator::new();
    mock.set_transactions("mock-checking-1", month_of_spending());
    let client = AggregatorClient::Mock(mock.clone());

    let engine = SyncEngine::new(&db, &client, None, FraudConfig::default());

    // Link creates local accounts with stored tokens
    let ids = engine.link_accounts("public-token").await.unwrap();
    assert_eq!(ids.len(), 2);
    let checking = ids[0];

    let outcome = engine.sync_account(checking).await.unwrap();
    assert_eq!(outcome.imported, 6);

    // Everything got a category from the cascade
    let txns = db.list_transactions(&TransactionFilter::default()).unwrap();
    assert_eq!(txns.len(), 6);
    assert!(txns.iter().all(|t| t.category_id.is_some()));

    let netflix = txns
        .iter()
        .find(|t| t.description.contains("NETFLIX"))
        .unwrap();
    assert_eq!(netflix.category_name.as_deref(), Some("Subscriptions"));
    assert_eq!(netflix.category_source, Some(CategorySource::MerchantPattern));

    let payroll = txns
        .iter()
        .find(|t| t.description.contains("PAYROLL"))
        .unwrap();
    assert_eq!(payroll.category_name.as_deref(), Some("Income"));
    assert_eq!(payroll.category_source, Some(CategorySource::Provider));

    // Second sync is a no-op
    let again = engine.sync_account(checking).await.unwrap();
    assert_eq!(again.imported, 0);
    assert_eq!(again.skipped, 6);
}

#[tokio::test]
async fn test_sync_trips_budget_and_fraud_alerts() {
    let db = Database::in_memory().unwrap();
    db.seed_defaults().unwrap();

    let groceries = db.get_category_by_name("Groceries").unwrap().unwrap();
    db.create_budget(&NewBudget {
        category_id: groceries.id,
        limit_amount: 120.0,
        start_date: date(6, 1),
        end_date: date(6, 30),
        alert_threshold_pct: 80.0,
    })
    .unwrap();

    let mock = MockAggregator::new();
    let mut txns = month_of_spending();
    // Burst of card swipes inside five minutes
    for (i, t) in [
        ("v1", "2024-06-20 14:00:05"),
        ("v2", "2024-06-20 14:01:10"),
        ("v3", "2024-06-20 14:02:30"),
        ("v4", "2024-06-20 14:03:45"),
    ]
    .iter()
    .enumerate()
    {
        let mut tx = provider_tx(t.0, date(6, 20), "GAMING STORE", -9.99 - i as f64);
        tx.posted_at = ts(t.1);
        txns.push(tx);
    }
    mock.set_transactions("mock-checking-1", txns);
    let client = AggregatorClient::Mock(mock.clone());

    let engine = SyncEngine::new(&db, &client, None, FraudConfig::default());
    let ids = engine.link_accounts("public-token").await.unwrap();
    let outcome = engine.sync_account(ids[0]).await.unwrap();

    // Groceries spend: 84.12 + 52.80 = 136.92 over a 120 limit
    assert!(outcome.budget_alerts >= 1);
    let progress = list_budget_progress(&db).unwrap();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].status, BudgetStatus::Exceeded);
    assert!(progress[0].remaining < 0.0);

    // The swipe burst raised velocity alerts
    let alerts = db.list_fraud_alerts(Some(false)).unwrap();
    assert!(alerts
        .iter()
        .any(|a| a.alert_type == FraudAlertType::Velocity));
}

#[tokio::test]
async fn test_backfill_after_rule_change() {
    let db = Database::in_memory().unwrap();
    db.seed_defaults().unwrap();

    let mock = MockAggregator::new();
    mock.set_transactions(
        "mock-checking-1",
        vec![provider_tx("t1", date(6, 1), "ACME COWORKING SPACE", -250.0)],
    );
    let client = AggregatorClient::Mock(mock.clone());
    let engine = SyncEngine::new(&db, &client, None, FraudConfig::default());
    let ids = engine.link_accounts("public-token").await.unwrap();
    engine.sync_account(ids[0]).await.unwrap();

    // Nothing matched, so it landed in Uncategorized needing review
    let txns = db.list_transactions(&TransactionFilter::default()).unwrap();
    assert_eq!(txns[0].category_name.as_deref(), Some("Uncategorized"));
    assert!(txns[0].needs_review);

    // A new rule plus a full backfill reclassifies it
    let utilities = db.get_category_by_name("Utilities").unwrap().unwrap();
    db.create_category_rule(utilities.id, "COWORKING", PatternType::Contains, 5)
        .unwrap();
    let cat_engine = CategoryEngine::new(&db, None);
    let result = cat_engine.backfill(false).await.unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.rule, 1);

    let txns = db.list_transactions(&TransactionFilter::default()).unwrap();
    assert_eq!(txns[0].category_name.as_deref(), Some("Utilities"));
    assert!(!txns[0].needs_review);
}

#[tokio::test]
async fn test_llm_stage_with_mock_backend() {
    let db = Database::in_memory().unwrap();
    db.seed_defaults().unwrap();

    let mock = MockAggregator::new();
    mock.set_transactions(
        "mock-checking-1",
        vec![provider_tx("t1", date(6, 2), "BLUE BOTTLE CAFE OAK ST", -5.75)],
    );
    let client = AggregatorClient::Mock(mock.clone());
    let ai = AIClient::mock();

    let engine = SyncEngine::new(&db, &client, Some(&ai), FraudConfig::default());
    let ids = engine.link_accounts("public-token").await.unwrap();
    engine.sync_account(ids[0]).await.unwrap();

    let txns = db.list_transactions(&TransactionFilter::default()).unwrap();
    assert_eq!(txns[0].category_name.as_deref(), Some("Dining"));
    assert_eq!(txns[0].category_source, Some(CategorySource::Llm));
}

#[tokio::test]
async fn test_export_after_sync() {
    let db = Database::in_memory().unwrap();
    db.seed_defaults().unwrap();

    let mock = MockAggregator::new();
    mock.set_transactions("mock-checking-1", month_of_spending());
    let client = AggregatorClient::Mock(mock.clone());
    let engine = SyncEngine::new(&db, &client, None, FraudConfig::default());
    let ids = engine.link_accounts("public-token").await.unwrap();
    engine.sync_account(ids[0]).await.unwrap();

    let csv = transactions_to_csv(&db, &TransactionFilter::default()).unwrap();
    assert_eq!(csv.lines().count(), 7);
    assert!(csv.contains("NETFLIX"));
    assert!(csv.contains("Subscriptions"));
    // Tokens and raw payloads stay out of exports
    assert!(!csv.contains("access-mock"));
}
