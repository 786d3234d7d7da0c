//! Shared types for aggregator backends

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// An account as reported by the aggregator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderAccount {
    pub provider_account_id: String,
    pub name: String,
    pub institution: String,
    #[serde(default)]
    pub account_type: Option<String>,
    /// Last four digits of the account number
    #[serde(default)]
    pub mask: Option<String>,
}

/// A transaction as reported by the aggregator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTransaction {
    pub provider_txn_id: String,
    pub date: NaiveDate,
    /// Authorization or post timestamp, when the provider has one
    #[serde(default)]
    pub posted_at: Option<NaiveDateTime>,
    pub description: String,
    #[serde(default)]
    pub merchant: Option<String>,
    /// Negative = expense, positive = credit
    pub amount: f64,
    /// Provider-side category string, e.g. "FOOD_AND_DRINK"
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub pending: bool,
}
