//! Category, rule, and merchant pattern endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    Json,
};
use serde::Deserialize;

use tally_core::{
    categorize::{BackfillResult, CategoryEngine, FALLBACK_CATEGORY},
    models::{Category, CategoryRule, MerchantPattern, PatternType},
};

use crate::{get_user_email, AppError, AppState, SuccessResponse};

use super::parse_body;

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Vec<Category>>, AppError> {
    let user = get_user_email(request.headers());
    let categories = state.db.list_categories()?;
    state
        .db
        .log_audit(&user, "category.list", Some("category"), None, None)?;
    Ok(Json(categories))
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
}

pub async fn create_category(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Category>, AppError> {
    let user = get_user_email(request.headers());
    let body: CreateCategoryRequest = parse_body(request).await?;
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("Category name is required"));
    }
    if state.db.get_category_by_name(name)?.is_some() {
        return Err(AppError::conflict(format!(
            "Category {} already exists",
            name
        )));
    }

    let id = state.db.create_category(name)?;
    let category = state.db.get_category(id)?;
    state.db.log_audit(
        &user,
        "category.create",
        Some("category"),
        Some(id),
        Some(name),
    )?;
    Ok(Json(category))
}

/// Delete a category; its transactions become uncategorized
pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let user = get_user_email(request.headers());
    let category = state.db.get_category(id)?;
    if category.name == FALLBACK_CATEGORY {
        return Err(AppError::bad_request(
            "The catch-all category cannot be deleted",
        ));
    }
    state.db.delete_category(id)?;
    state.db.log_audit(
        &user,
        "category.delete",
        Some("category"),
        Some(id),
        Some(&category.name),
    )?;
    Ok(Json(SuccessResponse::new(format!(
        "Category {} deleted",
        category.name
    ))))
}

pub async fn list_category_rules(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Vec<CategoryRule>>, AppError> {
    let user = get_user_email(request.headers());
    let rules = state.db.list_category_rules()?;
    state
        .db
        .log_audit(&user, "rule.list", Some("rule"), None, None)?;
    Ok(Json(rules))
}

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub category_id: i64,
    pub pattern: String,
    pub pattern_type: PatternType,
    #[serde(default)]
    pub priority: i32,
}

pub async fn create_category_rule(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<CategoryRule>, AppError> {
    let user = get_user_email(request.headers());
    let body: CreateRuleRequest = parse_body(request).await?;
    if body.pattern.trim().is_empty() {
        return Err(AppError::bad_request("Rule pattern is required"));
    }
    let category = match state.db.get_category(body.category_id) {
        Ok(c) => c,
        Err(tally_core::Error::NotFound(_)) => {
            return Err(AppError::bad_request("Unknown category id"))
        }
        Err(e) => return Err(e.into()),
    };

    // Invalid regex patterns are rejected here with a 400
    let id = state
        .db
        .create_category_rule(category.id, &body.pattern, body.pattern_type, body.priority)
        .map_err(|e| match e {
            tally_core::Error::Regex(e) => {
                AppError::bad_request(format!("Invalid regex pattern: {}", e))
            }
            other => other.into(),
        })?;

    let rules = state.db.list_category_rules()?;
    let rule = rules
        .into_iter()
        .find(|r| r.id == id)
        .ok_or_else(|| AppError::not_found("Rule not found after creation"))?;
    state.db.log_audit(
        &user,
        "rule.create",
        Some("rule"),
        Some(id),
        Some(&body.pattern),
    )?;
    Ok(Json(rule))
}

pub async fn delete_category_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let user = get_user_email(request.headers());
    state.db.delete_category_rule(id)?;
    state
        .db
        .log_audit(&user, "rule.delete", Some("rule"), Some(id), None)?;
    Ok(Json(SuccessResponse::new("Rule deleted")))
}

pub async fn list_merchant_patterns(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Vec<MerchantPattern>>, AppError> {
    let user = get_user_email(request.headers());
    let patterns = state.db.list_merchant_patterns()?;
    state.db.log_audit(
        &user,
        "merchant_pattern.list",
        Some("merchant_pattern"),
        None,
        None,
    )?;
    Ok(Json(patterns))
}

#[derive(Debug, Deserialize)]
pub struct CreateMerchantPatternRequest {
    pub keyword: String,
    pub category_id: i64,
}

pub async fn create_merchant_pattern(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let user = get_user_email(request.headers());
    let body: CreateMerchantPatternRequest = parse_body(request).await?;
    let keyword = body.keyword.trim();
    if keyword.is_empty() {
        return Err(AppError::bad_request("Keyword is required"));
    }
    if let Err(tally_core::Error::NotFound(_)) = state.db.get_category(body.category_id) {
        return Err(AppError::bad_request("Unknown category id"));
    }

    let id = state.db.create_merchant_pattern(keyword, body.category_id)?;
    state.db.log_audit(
        &user,
        "merchant_pattern.create",
        Some("merchant_pattern"),
        Some(id),
        Some(keyword),
    )?;
    Ok(Json(SuccessResponse::new("Merchant pattern created")))
}

pub async fn delete_merchant_pattern(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let user = get_user_email(request.headers());
    state.db.delete_merchant_pattern(id)?;
    state.db.log_audit(
        &user,
        "merchant_pattern.delete",
        Some("merchant_pattern"),
        Some(id),
        None,
    )?;
    Ok(Json(SuccessResponse::new("Merchant pattern deleted")))
}

#[derive(Debug, Default, Deserialize)]
pub struct BackfillRequest {
    /// Re-evaluate every transaction, not just uncategorized ones
    #[serde(default)]
    pub all: bool,
}

/// Re-run the categorization cascade over stored transactions
pub async fn backfill_categories(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<BackfillResult>, AppError> {
    let user = get_user_email(request.headers());
    let body: BackfillRequest = parse_body(request).await.unwrap_or_default();

    let engine = CategoryEngine::new(&state.db, state.ai.as_ref());
    let result = engine.backfill(!body.all).await?;
    state.db.log_audit(
        &user,
        "category.backfill",
        Some("category"),
        None,
        Some(&format!("{} reclassified", result.total)),
    )?;
    Ok(Json(result))
}
