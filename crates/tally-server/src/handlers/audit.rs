//! Audit log endpoint

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use tally_core::models::AuditEntry;

use crate::{AppError, AppState, MAX_PAGE_LIMIT};

#[derive(Debug, Deserialize)]
pub struct AuditParams {
    pub limit: Option<i64>,
}

/// Recent audit entries, newest first
///
/// Reads of the audit log itself are not audited.
pub async fn list_audit_log(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditParams>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    let limit = params.limit.unwrap_or(100).clamp(1, MAX_PAGE_LIMIT);
    let entries = state.db.list_audit_log(limit)?;
    Ok(Json(entries))
}
