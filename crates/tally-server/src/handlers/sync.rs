//! Sync endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    Json,
};
use serde::{Deserialize, Serialize};

use tally_core::{models::SyncRecord, SyncEngine, SyncOutcome};

use crate::{get_user_email, AppError, AppState, MAX_PAGE_LIMIT};

use super::accounts::require_aggregator;

/// Per-account result of a sync-all run
#[derive(Debug, Serialize)]
pub struct SyncAllEntry {
    pub account_id: i64,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SyncOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Sync every syncable account now
///
/// Per-account failures are reported in the response, not as an HTTP error.
pub async fn sync_all(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Vec<SyncAllEntry>>, AppError> {
    let user = get_user_email(request.headers());
    let aggregator = require_aggregator(&state)?;
    let engine = SyncEngine::new(
        &state.db,
        aggregator,
        state.ai.as_ref(),
        state.fraud_config.clone(),
    );

    let results = engine.sync_all().await?;
    let entries: Vec<SyncAllEntry> = results
        .into_iter()
        .map(|(account_id, result)| match result {
            Ok(outcome) => SyncAllEntry {
                account_id,
                ok: true,
                outcome: Some(outcome),
                error: None,
            },
            Err(e) => SyncAllEntry {
                account_id,
                ok: false,
                outcome: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    let synced = entries.iter().filter(|e| e.ok).count();
    state.db.log_audit(
        &user,
        "sync.all",
        None,
        None,
        Some(&format!("{}/{} accounts synced", synced, entries.len())),
    )?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct SyncHistoryParams {
    pub account_id: Option<i64>,
    pub limit: Option<i64>,
}

/// Recent sync runs, newest first
pub async fn sync_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SyncHistoryParams>,
    request: Request,
) -> Result<Json<Vec<SyncRecord>>, AppError> {
    let user = get_user_email(request.headers());
    let limit = params.limit.unwrap_or(50).clamp(1, MAX_PAGE_LIMIT);
    let records = state.db.list_sync_history(params.account_id, limit)?;
    state.db.log_audit(&user, "sync.history", None, None, None)?;
    Ok(Json(records))
}
