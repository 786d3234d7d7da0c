//! Transaction endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use tally_core::{
    categorize::CategoryEngine,
    db::TransactionFilter,
    models::{CategorySource, PatternType, Transaction},
};

use crate::{get_user_email, AppError, AppState, SuccessResponse, MAX_PAGE_LIMIT};

use super::parse_body;

/// Query parameters shared by the transaction list and CSV export
#[derive(Debug, Default, Deserialize)]
pub struct TransactionListParams {
    pub account_id: Option<i64>,
    pub category_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub pending: Option<bool>,
    pub needs_review: Option<bool>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl TransactionListParams {
    pub(crate) fn into_filter(self) -> TransactionFilter {
        TransactionFilter {
            account_id: self.account_id,
            category_id: self.category_id,
            from: self.from,
            to: self.to,
            pending: self.pending,
            needs_review: self.needs_review,
            search: self.search,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// List transactions with filtering and pagination
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TransactionListParams>,
    request: Request,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let user = get_user_email(request.headers());
    let mut filter = params.into_filter();
    filter.limit = Some(filter.limit.unwrap_or(100).clamp(1, MAX_PAGE_LIMIT));
    let transactions = state.db.list_transactions(&filter)?;
    state
        .db
        .log_audit(&user, "transaction.list", Some("transaction"), None, None)?;
    Ok(Json(transactions))
}

pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Transaction>, AppError> {
    let user = get_user_email(request.headers());
    let tx = state.db.get_transaction(id)?;
    state.db.log_audit(
        &user,
        "transaction.view",
        Some("transaction"),
        Some(id),
        None,
    )?;
    Ok(Json(tx))
}

#[derive(Debug, Deserialize)]
pub struct SetCategoryRequest {
    pub category_id: i64,
    /// Also create a contains-rule from the transaction's merchant so future
    /// imports categorize the same way
    #[serde(default)]
    pub create_rule: bool,
}

/// Manually set a transaction's category
///
/// Manual assignments get full confidence and clear the review flag.
pub async fn set_transaction_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Transaction>, AppError> {
    let user = get_user_email(request.headers());
    let body: SetCategoryRequest = parse_body(request).await?;

    let tx = state.db.get_transaction(id)?;
    let category = match state.db.get_category(body.category_id) {
        Ok(c) => c,
        Err(tally_core::Error::NotFound(_)) => {
            return Err(AppError::bad_request("Unknown category id"))
        }
        Err(e) => return Err(e.into()),
    };

    state
        .db
        .set_transaction_category(id, category.id, CategorySource::Manual, 100, false)?;

    if body.create_rule {
        let pattern = tx.merchant.clone().unwrap_or_else(|| tx.description.clone());
        state
            .db
            .create_category_rule(category.id, &pattern, PatternType::Contains, 10)?;
    }

    state.db.log_audit(
        &user,
        "transaction.set_category",
        Some("transaction"),
        Some(id),
        Some(&category.name),
    )?;
    Ok(Json(state.db.get_transaction(id)?))
}

/// Re-run the categorization cascade for one transaction
///
/// Useful after adding a rule that should cover an already-imported
/// transaction.
pub async fn recategorize_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Transaction>, AppError> {
    let user = get_user_email(request.headers());
    let tx = state.db.get_transaction(id)?;

    let engine = CategoryEngine::new(&state.db, state.ai.as_ref());
    let assignment = engine.categorize_and_store(&tx).await?;

    state.db.log_audit(
        &user,
        "transaction.recategorize",
        Some("transaction"),
        Some(id),
        Some(assignment.source.as_str()),
    )?;
    Ok(Json(state.db.get_transaction(id)?))
}

/// Accept a low-confidence categorization, clearing the review flag
pub async fn review_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let user = get_user_email(request.headers());
    state.db.get_transaction(id)?;
    state.db.clear_needs_review(id)?;
    state.db.log_audit(
        &user,
        "transaction.review",
        Some("transaction"),
        Some(id),
        None,
    )?;
    Ok(Json(SuccessResponse::new("Transaction marked reviewed")))
}
