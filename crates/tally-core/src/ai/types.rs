//! Shared types for AI backends

use serde::{Deserialize, Serialize};

/// Result of classifying a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionClassification {
    /// Category name; must be one of the names offered to the model
    pub category: String,
    /// Model-reported confidence 0-100, when the model provides one
    #[serde(default)]
    pub confidence: Option<i64>,
}
