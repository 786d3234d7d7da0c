//! HTTP request handlers
//!
//! Handlers take `State(Arc<AppState>)` plus extractors, and a trailing
//! `Request` when they need the caller identity or a JSON body. Every
//! handler writes an audit entry.

pub mod accounts;
pub mod audit;
pub mod budgets;
pub mod categories;
pub mod dashboard;
pub mod export;
pub mod fraud;
pub mod sync;
pub mod transactions;

pub use accounts::*;
pub use audit::*;
pub use budgets::*;
pub use categories::*;
pub use dashboard::*;
pub use export::*;
pub use fraud::*;
pub use sync::*;
pub use transactions::*;

use axum::extract::Request;
use serde::de::DeserializeOwned;

use crate::{AppError, MAX_BODY_BYTES};

/// Read and deserialize a JSON request body, enforcing the size cap
pub(crate) async fn parse_body<T: DeserializeOwned>(request: Request) -> Result<T, AppError> {
    let bytes = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|_| AppError::bad_request("Request body too large or unreadable"))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AppError::bad_request(format!("Invalid JSON body: {}", e)))
}
