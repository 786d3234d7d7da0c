//! Fraud alert endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use serde::Deserialize;

use tally_core::models::FraudAlert;

use crate::{get_user_email, AppError, AppState};

use super::parse_body;

#[derive(Debug, Deserialize)]
pub struct FraudAlertParams {
    /// Filter by review state; omit for all alerts
    pub reviewed: Option<bool>,
}

pub async fn list_fraud_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FraudAlertParams>,
    request: Request,
) -> Result<Json<Vec<FraudAlert>>, AppError> {
    let user = get_user_email(request.headers());
    let alerts = state.db.list_fraud_alerts(params.reviewed)?;
    state
        .db
        .log_audit(&user, "fraud.list", Some("fraud_alert"), None, None)?;
    Ok(Json(alerts))
}

pub async fn get_fraud_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<FraudAlert>, AppError> {
    let user = get_user_email(request.headers());
    let alert = state.db.get_fraud_alert(id)?;
    state
        .db
        .log_audit(&user, "fraud.view", Some("fraud_alert"), Some(id), None)?;
    Ok(Json(alert))
}

#[derive(Debug, Deserialize)]
pub struct ReviewFraudRequest {
    #[serde(default)]
    pub false_positive: bool,
    pub note: Option<String>,
}

/// Mark a fraud alert reviewed, optionally as a false positive
pub async fn review_fraud_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<FraudAlert>, AppError> {
    let user = get_user_email(request.headers());
    let body: ReviewFraudRequest = parse_body(request).await.unwrap_or(ReviewFraudRequest {
        false_positive: false,
        note: None,
    });

    state
        .db
        .review_fraud_alert(id, body.false_positive, body.note.as_deref())?;
    let alert = state.db.get_fraud_alert(id)?;
    state.db.log_audit(
        &user,
        "fraud.review",
        Some("fraud_alert"),
        Some(id),
        body.false_positive.then_some("false positive"),
    )?;
    Ok(Json(alert))
}
