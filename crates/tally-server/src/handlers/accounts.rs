//! Account linking and management endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use tally_core::{models::Account, AggregatorBackend, SyncEngine};

use crate::{get_user_email, AppError, AppState, SuccessResponse};

use super::parse_body;

#[derive(Debug, Deserialize)]
pub struct ListAccountsParams {
    #[serde(default)]
    pub include_unlinked: bool,
}

/// List accounts, excluding unlinked ones unless asked
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListAccountsParams>,
    request: Request,
) -> Result<Json<Vec<Account>>, AppError> {
    let user = get_user_email(request.headers());
    let accounts = state.db.list_accounts(params.include_unlinked)?;
    state
        .db
        .log_audit(&user, "account.list", Some("account"), None, None)?;
    Ok(Json(accounts))
}

pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Account>, AppError> {
    let user = get_user_email(request.headers());
    let account = state.db.get_account(id)?;
    state
        .db
        .log_audit(&user, "account.view", Some("account"), Some(id), None)?;
    Ok(Json(account))
}

/// Create a link token for the client-side link flow
pub async fn create_link_token(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Value>, AppError> {
    let user = get_user_email(request.headers());
    let aggregator = require_aggregator(&state)?;
    let token = aggregator.create_link_token().await?;
    state
        .db
        .log_audit(&user, "account.link_token", Some("account"), None, None)?;
    Ok(Json(json!({"link_token": token})))
}

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    pub public_token: String,
}

/// Complete the link flow, creating a local account per provider account
pub async fn link_accounts(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Vec<Account>>, AppError> {
    let user = get_user_email(request.headers());
    let body: LinkRequest = parse_body(request).await?;
    if body.public_token.is_empty() {
        return Err(AppError::bad_request("public_token is required"));
    }

    let aggregator = require_aggregator(&state)?;
    let engine = SyncEngine::new(
        &state.db,
        aggregator,
        state.ai.as_ref(),
        state.fraud_config.clone(),
    );
    let ids = engine.link_accounts(&body.public_token).await?;

    let mut accounts = Vec::with_capacity(ids.len());
    for id in &ids {
        accounts.push(state.db.get_account(*id)?);
    }
    state.db.log_audit(
        &user,
        "account.link",
        Some("account"),
        ids.first().copied(),
        Some(&format!("{} accounts linked", ids.len())),
    )?;
    Ok(Json(accounts))
}

/// Unlink an account: the access token is dropped, history is kept
pub async fn unlink_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let user = get_user_email(request.headers());
    let account = state.db.get_account(id)?;
    state.db.unlink_account(id)?;
    state.db.log_audit(
        &user,
        "account.unlink",
        Some("account"),
        Some(id),
        Some(&account.name),
    )?;
    Ok(Json(SuccessResponse::new(format!(
        "Account {} unlinked",
        account.name
    ))))
}

/// Sync one account now
pub async fn sync_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<tally_core::SyncOutcome>, AppError> {
    let user = get_user_email(request.headers());
    // 404 for unknown accounts before reaching for the aggregator
    state.db.get_account(id)?;
    let aggregator = require_aggregator(&state)?;
    let engine = SyncEngine::new(
        &state.db,
        aggregator,
        state.ai.as_ref(),
        state.fraud_config.clone(),
    );
    let outcome = engine.sync_account(id).await?;
    state.db.log_audit(
        &user,
        "account.sync",
        Some("account"),
        Some(id),
        Some(&format!("{} imported", outcome.imported)),
    )?;
    Ok(Json(outcome))
}

pub(crate) fn require_aggregator(
    state: &AppState,
) -> Result<&tally_core::AggregatorClient, AppError> {
    state
        .aggregator
        .as_ref()
        .ok_or_else(|| AppError::bad_request("No aggregator is configured"))
}
