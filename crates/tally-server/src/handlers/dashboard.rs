//! Health and dashboard endpoints

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    Json,
};
use serde_json::{json, Value};

use tally_core::models::DashboardStats;

use crate::{get_user_email, AppError, AppState};

/// Unauthenticated liveness probe
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Summary counts for the dashboard view
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<DashboardStats>, AppError> {
    let user = get_user_email(request.headers());
    let stats = state.db.get_dashboard_stats()?;
    state.db.log_audit(&user, "dashboard.view", None, None, None)?;
    Ok(Json(stats))
}
