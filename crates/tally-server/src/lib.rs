//! REST API server for Tally
//!
//! Exposes the core library over HTTP: account linking and sync, transactions,
//! categories and rules, budgets, fraud alerts, CSV export, and the audit log.
//!
//! # Security
//!
//! Authentication is required by default. A request is accepted when either:
//! - its client IP falls inside a configured trusted network, or
//! - it carries a valid API key (`Authorization: Bearer <key>`)
//!
//! `X-Forwarded-For` is only honored when the direct peer is a configured
//! trusted proxy. API keys are compared in constant time.

pub mod handlers;
pub mod rate_limit;
pub mod scheduler;

#[cfg(test)]
mod tests;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use ipnet::IpNet;
use serde::Serialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use tally_core::{AIBackend, AIClient, AggregatorBackend, AggregatorClient, Database, FraudConfig};

use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::scheduler::PollScheduleConfig;

/// Maximum accepted JSON request body size
pub(crate) const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Hard cap on page sizes for list endpoints
pub(crate) const MAX_PAGE_LIMIT: i64 = 500;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Require authentication on /api routes (default: true)
    pub require_auth: bool,
    /// Origins allowed for CORS; empty means same-origin only
    pub allowed_origins: Vec<String>,
    /// Accepted API keys for `Authorization: Bearer`
    pub api_keys: Vec<String>,
    /// Networks whose clients bypass authentication (e.g. 127.0.0.0/8)
    pub trusted_networks: Vec<IpNet>,
    /// Proxies whose X-Forwarded-For header is honored
    pub trusted_proxies: Vec<IpAddr>,
    /// Per-IP rate limiting; None disables it
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: Vec::new(),
            api_keys: Vec::new(),
            trusted_networks: Vec::new(),
            trusted_proxies: Vec::new(),
            rate_limit: Some(RateLimitConfig::default()),
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub ai: Option<AIClient>,
    pub aggregator: Option<AggregatorClient>,
    pub fraud_config: FraudConfig,
    pub rate_limiter: Option<RateLimiter>,
}

impl AppState {
    pub fn new(
        db: Database,
        config: ServerConfig,
        ai: Option<AIClient>,
        aggregator: Option<AggregatorClient>,
    ) -> Self {
        let rate_limiter = config.rate_limit.clone().map(RateLimiter::new);
        Self {
            db,
            config,
            ai,
            aggregator,
            fraud_config: FraudConfig::default(),
            rate_limiter,
        }
    }
}

/// Parse a comma-separated list of CIDR networks or bare IPs
///
/// Unparseable entries are skipped with a warning rather than failing
/// startup.
pub fn parse_trusted_networks(input: &str) -> Vec<IpNet> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            if let Ok(net) = s.parse::<IpNet>() {
                Some(net)
            } else if let Ok(ip) = s.parse::<IpAddr>() {
                Some(IpNet::from(ip))
            } else {
                warn!(entry = %s, "Ignoring unparseable trusted network entry");
                None
            }
        })
        .collect()
}

pub(crate) fn is_ip_trusted(ip: IpAddr, networks: &[IpNet]) -> bool {
    networks.iter().any(|net| net.contains(&ip))
}

/// Resolve the client IP for a request
///
/// X-Forwarded-For is only consulted when the direct peer is a trusted
/// proxy; otherwise the header is attacker-controlled.
pub fn get_client_ip(headers: &HeaderMap, peer: IpAddr, trusted_proxies: &[IpAddr]) -> IpAddr {
    if trusted_proxies.contains(&peer) {
        if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            if let Some(ip) = forwarded
                .split(',')
                .next()
                .map(str::trim)
                .and_then(|s| s.parse::<IpAddr>().ok())
            {
                return ip;
            }
        }
    }
    peer
}

/// Constant-time API key check against all configured keys
fn verify_api_key(candidate: &str, keys: &[String]) -> bool {
    let mut matched = false;
    for key in keys {
        if key.len() == candidate.len() && bool::from(key.as_bytes().ct_eq(candidate.as_bytes())) {
            matched = true;
        }
    }
    matched
}

/// Authentication middleware for /api routes
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let client_ip = get_client_ip(request.headers(), addr.ip(), &state.config.trusted_proxies);
    if is_ip_trusted(client_ip, &state.config.trusted_networks) {
        return next.run(request).await;
    }

    if let Some(auth) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(key) = auth.strip_prefix("Bearer ") {
            if verify_api_key(key, &state.config.api_keys) {
                return next.run(request).await;
            }
        }
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "Authentication required"})),
    )
        .into_response()
}

/// Identify the requesting user for audit logging
///
/// Falls back to "api-key" for key-authenticated requests and "local-dev"
/// for trusted-network access.
pub fn get_user_email(headers: &HeaderMap) -> String {
    if let Some(email) = headers.get("x-user-email").and_then(|v| v.to_str().ok()) {
        if !email.is_empty() {
            return email.to_string();
        }
    }
    if headers.contains_key(header::AUTHORIZATION) {
        return "api-key".to_string();
    }
    "local-dev".to_string()
}

/// Standard success response for mutations with no payload
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

impl SuccessResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// API error carrying an HTTP status and a client-safe message
///
/// Internal details are logged, never returned to the client.
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            internal: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            internal: None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
            internal: None,
        }
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error".to_string(),
            internal: Some(err.into()),
        }
    }
}

impl From<tally_core::Error> for AppError {
    fn from(err: tally_core::Error) -> Self {
        match err {
            tally_core::Error::NotFound(msg) => AppError::not_found(msg),
            tally_core::Error::InvalidData(msg) => AppError::bad_request(msg),
            tally_core::Error::Aggregator(msg) => Self {
                status: StatusCode::BAD_GATEWAY,
                message: format!("Aggregator error: {}", msg),
                internal: None,
            },
            other => AppError::internal(other),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(internal) = &self.internal {
            error!(status = %self.status, error = %internal, "Request failed");
        }
        (self.status, Json(json!({"error": self.message}))).into_response()
    }
}

/// Build the application router
pub fn create_router(state: Arc<AppState>, static_dir: Option<&str>) -> Router {
    let api = Router::new()
        .route("/dashboard", get(handlers::get_dashboard))
        .route("/accounts", get(handlers::list_accounts))
        .route("/accounts/link-token", post(handlers::create_link_token))
        .route("/accounts/link", post(handlers::link_accounts))
        .route("/accounts/:id", get(handlers::get_account))
        .route("/accounts/:id/unlink", post(handlers::unlink_account))
        .route("/accounts/:id/sync", post(handlers::sync_account))
        .route("/transactions", get(handlers::list_transactions))
        .route("/transactions/:id", get(handlers::get_transaction))
        .route(
            "/transactions/:id/category",
            put(handlers::set_transaction_category),
        )
        .route("/transactions/:id/review", post(handlers::review_transaction))
        .route(
            "/transactions/:id/recategorize",
            post(handlers::recategorize_transaction),
        )
        .route(
            "/categories",
            get(handlers::list_categories).post(handlers::create_category),
        )
        .route("/categories/backfill", post(handlers::backfill_categories))
        .route("/categories/:id", delete(handlers::delete_category))
        .route(
            "/rules",
            get(handlers::list_category_rules).post(handlers::create_category_rule),
        )
        .route("/rules/:id", delete(handlers::delete_category_rule))
        .route(
            "/merchant-patterns",
            get(handlers::list_merchant_patterns).post(handlers::create_merchant_pattern),
        )
        .route(
            "/merchant-patterns/:id",
            delete(handlers::delete_merchant_pattern),
        )
        .route(
            "/budgets",
            get(handlers::list_budgets).post(handlers::create_budget),
        )
        .route("/budgets/progress", get(handlers::budget_progress))
        .route("/budgets/alerts", get(handlers::list_budget_alerts))
        .route(
            "/budgets/:id",
            get(handlers::get_budget)
                .put(handlers::update_budget)
                .delete(handlers::delete_budget),
        )
        .route("/budgets/:id/progress", get(handlers::get_budget_progress))
        .route("/fraud-alerts", get(handlers::list_fraud_alerts))
        .route("/fraud-alerts/:id", get(handlers::get_fraud_alert))
        .route("/fraud-alerts/:id/review", post(handlers::review_fraud_alert))
        .route("/export/transactions", get(handlers::export_transactions))
        .route("/export/budgets", get(handlers::export_budgets))
        .route("/sync", post(handlers::sync_all))
        .route("/sync/history", get(handlers::sync_history))
        .route("/audit", get(handlers::list_audit_log))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ))
        .with_state(state.clone());

    let cors = if state.config.allowed_origins.is_empty() {
        CorsLayer::new()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    let mut app = Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'self'"),
        ))
        .layer(TraceLayer::new_for_http());

    if let Some(dir) = static_dir {
        app = app.fallback_service(tower_http::services::ServeDir::new(dir));
    }

    app
}

/// Start the server with the given configuration
///
/// Backends (AI, aggregator) are built from the environment; either may be
/// absent, disabling the features that depend on it.
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("Authentication disabled; all API requests are accepted");
    } else if config.api_keys.is_empty() && config.trusted_networks.is_empty() {
        warn!("No API keys or trusted networks configured; every API request will be rejected");
    }

    let ai = AIClient::from_env();
    match &ai {
        Some(client) => {
            if client.health_check().await {
                info!(host = %client.host(), model = %client.model(), "AI backend reachable");
            } else {
                warn!(host = %client.host(), "AI backend not reachable; LLM categorization is unavailable");
            }
        }
        None => info!("No AI backend configured; categorization skips the LLM stage"),
    }

    let aggregator = AggregatorClient::from_env();
    match &aggregator {
        Some(client) => {
            if client.health_check().await {
                info!(host = %client.host(), "Aggregator reachable");
            } else {
                warn!(host = %client.host(), "Aggregator not reachable; linking and sync will fail");
            }
        }
        None => warn!("No aggregator configured; linking and sync endpoints are disabled"),
    }

    let state = Arc::new(AppState::new(db, config, ai, aggregator));

    if let Some(poll_config) = PollScheduleConfig::from_env() {
        if state.aggregator.is_some() {
            scheduler::start_poll_scheduler(state.clone(), poll_config);
        } else {
            warn!("Poll schedule configured but no aggregator is available");
        }
    }

    let app = create_router(state, static_dir);
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Tally API server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
