//! Budget endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use serde::Deserialize;

use tally_core::{
    budget::{budget_progress as compute_progress, list_budget_progress, BudgetProgress},
    models::{Budget, BudgetAlert, NewBudget},
};

use crate::{get_user_email, AppError, AppState, SuccessResponse};

use super::parse_body;

pub async fn list_budgets(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Vec<Budget>>, AppError> {
    let user = get_user_email(request.headers());
    let budgets = state.db.list_budgets()?;
    state
        .db
        .log_audit(&user, "budget.list", Some("budget"), None, None)?;
    Ok(Json(budgets))
}

pub async fn get_budget(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Budget>, AppError> {
    let user = get_user_email(request.headers());
    let budget = state.db.get_budget(id)?;
    state
        .db
        .log_audit(&user, "budget.view", Some("budget"), Some(id), None)?;
    Ok(Json(budget))
}

pub async fn create_budget(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Budget>, AppError> {
    let user = get_user_email(request.headers());
    let body: NewBudget = parse_body(request).await?;
    if let Err(tally_core::Error::NotFound(_)) = state.db.get_category(body.category_id) {
        return Err(AppError::bad_request("Unknown category id"));
    }

    let id = state.db.create_budget(&body)?;
    let budget = state.db.get_budget(id)?;
    state
        .db
        .log_audit(&user, "budget.create", Some("budget"), Some(id), None)?;
    Ok(Json(budget))
}

/// Replace a budget's fields
///
/// Raising the limit can resolve open alerts on the next evaluation.
pub async fn update_budget(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Budget>, AppError> {
    let user = get_user_email(request.headers());
    let body: NewBudget = parse_body(request).await?;
    state.db.get_budget(id)?;
    state.db.update_budget(id, &body)?;
    let budget = state.db.get_budget(id)?;
    state
        .db
        .log_audit(&user, "budget.update", Some("budget"), Some(id), None)?;
    Ok(Json(budget))
}

pub async fn delete_budget(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let user = get_user_email(request.headers());
    state.db.get_budget(id)?;
    state.db.delete_budget(id)?;
    state
        .db
        .log_audit(&user, "budget.delete", Some("budget"), Some(id), None)?;
    Ok(Json(SuccessResponse::new("Budget deleted")))
}

/// Spending progress for every budget
pub async fn budget_progress(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Vec<BudgetProgress>>, AppError> {
    let user = get_user_email(request.headers());
    let progress = list_budget_progress(&state.db)?;
    state
        .db
        .log_audit(&user, "budget.progress", Some("budget"), None, None)?;
    Ok(Json(progress))
}

/// Spending progress for a single budget
pub async fn get_budget_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<BudgetProgress>, AppError> {
    let user = get_user_email(request.headers());
    let budget = state.db.get_budget(id)?;
    let progress = compute_progress(&state.db, &budget)?;
    state
        .db
        .log_audit(&user, "budget.progress", Some("budget"), Some(id), None)?;
    Ok(Json(progress))
}

#[derive(Debug, Deserialize)]
pub struct BudgetAlertParams {
    #[serde(default)]
    pub include_resolved: bool,
}

pub async fn list_budget_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BudgetAlertParams>,
    request: Request,
) -> Result<Json<Vec<BudgetAlert>>, AppError> {
    let user = get_user_email(request.headers());
    let alerts = state.db.list_budget_alerts(params.include_resolved)?;
    state
        .db
        .log_audit(&user, "budget.alerts", Some("budget"), None, None)?;
    Ok(Json(alerts))
}
