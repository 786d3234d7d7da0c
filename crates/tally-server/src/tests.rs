//! Router-level tests
//!
//! These exercise the full stack (routing, auth, rate limiting, handlers)
//! against an in-memory database and the mock aggregator.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use tally_core::{
    aggregator::{AggregatorClient, MockAggregator, ProviderTransaction},
    AIClient, Database,
};

use crate::rate_limit::RateLimitConfig;
use crate::{create_router, parse_trusted_networks, AppState, ServerConfig};

fn test_state(config: ServerConfig, mock: &MockAggregator) -> Arc<AppState> {
    let db = Database::in_memory().unwrap();
    db.seed_defaults().unwrap();
    Arc::new(AppState::new(
        db,
        config,
        Some(AIClient::mock()),
        Some(AggregatorClient::Mock(mock.clone())),
    ))
}

/// Auth and rate limiting off; most tests only care about handler behavior
fn open_config() -> ServerConfig {
    ServerConfig {
        require_auth: false,
        rate_limit: None,
        ..Default::default()
    }
}

fn app(state: Arc<AppState>) -> Router {
    // oneshot requests have no real peer, so inject one
    create_router(state, None).layer(MockConnectInfo(SocketAddr::from(([192, 0, 2, 1], 40000))))
}

fn open_app() -> Router {
    app(test_state(open_config(), &MockAggregator::new()))
}

async fn get(router: &Router, path: &str) -> Response {
    router
        .clone()
        .oneshot(
            Request::builder()
                .uri(path)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn send_json(router: &Router, method: &str, path: &str, body: Value) -> Response {
    router
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(path)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn provider_tx(id: &str, date: &str, description: &str, amount: f64) -> ProviderTransaction {
    ProviderTransaction {
        provider_txn_id: id.to_string(),
        date: date.parse().unwrap(),
        posted_at: None,
        description: description.to_string(),
        merchant: None,
        amount,
        category: None,
        location: None,
        pending: false,
    }
}

async fn link(router: &Router) -> Vec<i64> {
    let response = send_json(
        router,
        "POST",
        "/api/accounts/link",
        json!({"public_token": "public-test"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let accounts = body_json(response).await;
    accounts
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn test_health_is_public() {
    // Auth required, no keys configured: /health must still answer
    let router = app(test_state(ServerConfig::default(), &MockAggregator::new()));
    let response = get(&router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_api_requires_auth() {
    let router = app(test_state(ServerConfig::default(), &MockAggregator::new()));
    let response = get(&router, "/api/accounts").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Authentication required");
}

#[tokio::test]
async fn test_api_key_auth() {
    let config = ServerConfig {
        api_keys: vec!["secret-key-123".to_string()],
        rate_limit: None,
        ..Default::default()
    };
    let router = app(test_state(config, &MockAggregator::new()));

    let ok = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/accounts")
                .header(header::AUTHORIZATION, "Bearer secret-key-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);

    let wrong = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/accounts")
                .header(header::AUTHORIZATION, "Bearer secret-key-124")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_trusted_network_bypasses_auth() {
    let config = ServerConfig {
        trusted_networks: parse_trusted_networks("192.0.2.0/24"),
        rate_limit: None,
        ..Default::default()
    };
    let router = app(test_state(config, &MockAggregator::new()));
    let response = get(&router, "/api/accounts").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let config = ServerConfig {
        require_auth: false,
        rate_limit: Some(RateLimitConfig {
            max_requests: 2,
            window: std::time::Duration::from_secs(60),
        }),
        ..Default::default()
    };
    let router = app(test_state(config, &MockAggregator::new()));

    assert_eq!(get(&router, "/api/accounts").await.status(), StatusCode::OK);
    assert_eq!(get(&router, "/api/accounts").await.status(), StatusCode::OK);
    let limited = get(&router, "/api/accounts").await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers().contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn test_link_and_list_accounts() {
    let router = open_app();
    let ids = link(&router).await;
    assert_eq!(ids.len(), 2);

    let response = get(&router, "/api/accounts").await;
    assert_eq!(response.status(), StatusCode::OK);
    let accounts = body_json(response).await;
    assert_eq!(accounts.as_array().unwrap().len(), 2);
    assert_eq!(accounts[0]["institution"], "Mock Bank");
}

#[tokio::test]
async fn test_unknown_account_is_404() {
    let router = open_app();
    let response = get(&router, "/api/accounts/999").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_json_body_is_400() {
    let router = open_app();
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/accounts/link")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sync_imports_and_lists_transactions() {
    let mock = MockAggregator::new();
    mock.set_transactions(
        "mock-checking-1",
        vec![
            provider_tx("t1", "2024-06-01", "NETFLIX.COM", -15.99),
            provider_tx("t2", "2024-06-03", "WHOLE FOODS MARKET", -84.12),
        ],
    );
    let router = app(test_state(open_config(), &mock));
    let ids = link(&router).await;

    let response = send_json(
        &router,
        "POST",
        &format!("/api/accounts/{}/sync", ids[0]),
        json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = body_json(response).await;
    assert_eq!(outcome["imported"], 2);

    let response = get(&router, "/api/transactions?search=netflix").await;
    let txns = body_json(response).await;
    assert_eq!(txns.as_array().unwrap().len(), 1);
    assert_eq!(txns[0]["category_name"], "Subscriptions");
}

#[tokio::test]
async fn test_set_category_manually() {
    let mock = MockAggregator::new();
    mock.set_transactions(
        "mock-checking-1",
        vec![provider_tx("t1", "2024-06-01", "MYSTERY VENDOR", -9.0)],
    );
    let router = app(test_state(open_config(), &mock));
    let ids = link(&router).await;
    send_json(
        &router,
        "POST",
        &format!("/api/accounts/{}/sync", ids[0]),
        json!({}),
    )
    .await;

    let txns = body_json(get(&router, "/api/transactions").await).await;
    let tx_id = txns[0]["id"].as_i64().unwrap();
    let categories = body_json(get(&router, "/api/categories").await).await;
    let dining = categories
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == "Dining")
        .unwrap()["id"]
        .as_i64()
        .unwrap();

    let response = send_json(
        &router,
        "PUT",
        &format!("/api/transactions/{}/category", tx_id),
        json!({"category_id": dining, "create_rule": true}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["category_name"], "Dining");
    assert_eq!(updated["category_source"], "manual");
    assert_eq!(updated["needs_review"], false);

    // create_rule made a contains-rule from the description
    let rules = body_json(get(&router, "/api/rules").await).await;
    assert!(rules
        .as_array()
        .unwrap()
        .iter()
        .any(|r| r["pattern"] == "MYSTERY VENDOR"));

    let response = send_json(
        &router,
        "PUT",
        &format!("/api/transactions/{}/category", tx_id),
        json!({"category_id": 99999}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_category_crud() {
    let router = open_app();

    let response = send_json(&router, "POST", "/api/categories", json!({"name": "Hobby"})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    assert_eq!(created["name"], "Hobby");

    let duplicate =
        send_json(&router, "POST", "/api/categories", json!({"name": "hobby"})).await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    // The catch-all is protected
    let categories = body_json(get(&router, "/api/categories").await).await;
    let uncategorized = categories
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == "Uncategorized")
        .unwrap()["id"]
        .as_i64()
        .unwrap();
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/categories/{}", uncategorized))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rule_validation() {
    let router = open_app();
    let categories = body_json(get(&router, "/api/categories").await).await;
    let dining = categories
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == "Dining")
        .unwrap()["id"]
        .as_i64()
        .unwrap();

    let bad_regex = send_json(
        &router,
        "POST",
        "/api/rules",
        json!({"category_id": dining, "pattern": "([", "pattern_type": "regex"}),
    )
    .await;
    assert_eq!(bad_regex.status(), StatusCode::BAD_REQUEST);

    let ok = send_json(
        &router,
        "POST",
        "/api/rules",
        json!({"category_id": dining, "pattern": "COFFEE|CAFE", "pattern_type": "contains", "priority": 5}),
    )
    .await;
    assert_eq!(ok.status(), StatusCode::OK);
    let rule = body_json(ok).await;
    assert_eq!(rule["priority"], 5);
}

#[tokio::test]
async fn test_budget_crud_and_progress() {
    let router = open_app();
    let categories = body_json(get(&router, "/api/categories").await).await;
    let groceries = categories
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == "Groceries")
        .unwrap()["id"]
        .as_i64()
        .unwrap();

    let response = send_json(
        &router,
        "POST",
        "/api/budgets",
        json!({
            "category_id": groceries,
            "limit_amount": 400.0,
            "start_date": "2024-06-01",
            "end_date": "2024-06-30",
            "alert_threshold_pct": 80.0,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let budget = body_json(response).await;
    let budget_id = budget["id"].as_i64().unwrap();

    let progress = body_json(get(&router, "/api/budgets/progress").await).await;
    assert_eq!(progress.as_array().unwrap().len(), 1);
    assert_eq!(progress[0]["status"], "ok");
    assert_eq!(progress[0]["spent"], 0.0);

    let response = send_json(
        &router,
        "PUT",
        &format!("/api/budgets/{}", budget_id),
        json!({
            "category_id": groceries,
            "limit_amount": 250.0,
            "start_date": "2024-06-01",
            "end_date": "2024-06-30",
            "alert_threshold_pct": 90.0,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["limit_amount"], 250.0);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/budgets/{}", budget_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        get(&router, &format!("/api/budgets/{}", budget_id))
            .await
            .status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_recategorize_after_rule_change() {
    let mock = MockAggregator::new();
    mock.set_transactions(
        "mock-checking-1",
        vec![provider_tx("t1", "2024-06-01", "CORNER BAKERY", -7.50)],
    );
    let router = app(test_state(open_config(), &mock));
    let ids = link(&router).await;
    send_json(
        &router,
        "POST",
        &format!("/api/accounts/{}/sync", ids[0]),
        json!({}),
    )
    .await;

    let txns = body_json(get(&router, "/api/transactions").await).await;
    let tx_id = txns[0]["id"].as_i64().unwrap();

    let categories = body_json(get(&router, "/api/categories").await).await;
    let dining = categories
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == "Dining")
        .unwrap()["id"]
        .as_i64()
        .unwrap();
    send_json(
        &router,
        "POST",
        "/api/rules",
        json!({"category_id": dining, "pattern": "BAKERY", "pattern_type": "contains"}),
    )
    .await;

    let response = send_json(
        &router,
        "POST",
        &format!("/api/transactions/{}/recategorize", tx_id),
        json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["category_name"], "Dining");
    assert_eq!(updated["category_source"], "rule");
}

#[tokio::test]
async fn test_single_budget_progress() {
    let router = open_app();
    let categories = body_json(get(&router, "/api/categories").await).await;
    let groceries = categories
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == "Groceries")
        .unwrap()["id"]
        .as_i64()
        .unwrap();

    let budget = body_json(
        send_json(
            &router,
            "POST",
            "/api/budgets",
            json!({
                "category_id": groceries,
                "limit_amount": 100.0,
                "start_date": "2024-06-01",
                "end_date": "2024-06-30",
            }),
        )
        .await,
    )
    .await;
    let budget_id = budget["id"].as_i64().unwrap();
    // Threshold omitted in the body falls back to the default
    assert_eq!(budget["alert_threshold_pct"], 80.0);

    let response = get(&router, &format!("/api/budgets/{}/progress", budget_id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let progress = body_json(response).await;
    assert_eq!(progress["budget_id"], budget_id);
    assert_eq!(progress["status"], "ok");

    assert_eq!(
        get(&router, "/api/budgets/999/progress").await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_fraud_review_unknown_alert_is_404() {
    let router = open_app();
    let response = send_json(
        &router,
        "POST",
        "/api/fraud-alerts/42/review",
        json!({"false_positive": true}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_export_transactions_csv() {
    let mock = MockAggregator::new();
    mock.set_transactions(
        "mock-checking-1",
        vec![provider_tx("t1", "2024-06-01", "NETFLIX.COM", -15.99)],
    );
    let router = app(test_state(open_config(), &mock));
    let ids = link(&router).await;
    send_json(
        &router,
        "POST",
        &format!("/api/accounts/{}/sync", ids[0]),
        json!({}),
    )
    .await;

    let response = get(&router, "/api/export/transactions").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let csv = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(csv.contains("NETFLIX"));
}

#[tokio::test]
async fn test_audit_trail_records_actions() {
    let router = open_app();
    link(&router).await;
    get(&router, "/api/transactions").await;

    let entries = body_json(get(&router, "/api/audit").await).await;
    let actions: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["action"].as_str())
        .collect();
    assert!(actions.contains(&"account.link"));
    assert!(actions.contains(&"transaction.list"));
    // No auth headers on these requests, so the fallback identity is used
    assert!(entries
        .as_array()
        .unwrap()
        .iter()
        .all(|e| e["user"] == "local-dev"));
}

#[tokio::test]
async fn test_sync_all_reports_per_account_results() {
    let mock = MockAggregator::new();
    let router = app(test_state(open_config(), &mock));
    link(&router).await;

    mock.set_failing(true);
    let response = send_json(&router, "POST", "/api/sync", json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let entries = body_json(response).await;
    assert_eq!(entries.as_array().unwrap().len(), 2);
    assert!(entries
        .as_array()
        .unwrap()
        .iter()
        .all(|e| e["ok"] == false && e["error"].is_string()));

    mock.set_failing(false);
    let response = send_json(&router, "POST", "/api/sync", json!({})).await;
    let entries = body_json(response).await;
    assert!(entries.as_array().unwrap().iter().all(|e| e["ok"] == true));
}
