//! CSV export endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    http::header,
    response::{IntoResponse, Response},
};

use tally_core::export::{budgets_to_csv, transactions_to_csv};

use crate::{get_user_email, AppError, AppState};

use super::transactions::TransactionListParams;

fn csv_response(filename: &str, csv: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        csv,
    )
        .into_response()
}

/// Export transactions as CSV, honoring the same filters as the list
pub async fn export_transactions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TransactionListParams>,
    request: Request,
) -> Result<Response, AppError> {
    let user = get_user_email(request.headers());
    let csv = transactions_to_csv(&state.db, &params.into_filter())?;
    state
        .db
        .log_audit(&user, "export.transactions", None, None, None)?;
    Ok(csv_response("transactions.csv", csv))
}

/// Export budget progress as CSV
pub async fn export_budgets(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, AppError> {
    let user = get_user_email(request.headers());
    let csv = budgets_to_csv(&state.db)?;
    state.db.log_audit(&user, "export.budgets", None, None, None)?;
    Ok(csv_response("budgets.csv", csv))
}
