//! Domain models for Tally

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A linked bank or credit account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub institution: String,
    pub account_type: Option<AccountType>,
    /// Last four digits of the account number, as reported by the aggregator
    pub mask: Option<String>,
    /// Aggregator-side account identifier
    pub provider_account_id: Option<String>,
    pub status: AccountStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Account types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Checking,
    Savings,
    Credit,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Savings => "savings",
            Self::Credit => "credit",
        }
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "checking" => Ok(Self::Checking),
            "savings" => Ok(Self::Savings),
            "credit" => Ok(Self::Credit),
            _ => Err(format!("Unknown account type: {}", s)),
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sync lifecycle state of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Linked and syncing normally
    #[default]
    Active,
    /// All retry attempts for the last sync failed; waiting for next full poll
    SyncFailed,
    /// Unlinked by the user; kept for history, never synced
    Unlinked,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::SyncFailed => "sync_failed",
            Self::Unlinked => "unlinked",
        }
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "sync_failed" => Ok(Self::SyncFailed),
            "unlinked" => Ok(Self::Unlinked),
            _ => Err(format!("Unknown account status: {}", s)),
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub account_id: i64,
    /// Aggregator-side transaction identifier
    pub provider_txn_id: Option<String>,
    pub date: NaiveDate,
    /// Provider timestamp when available (pending auth time or post time)
    pub posted_at: Option<NaiveDateTime>,
    pub description: String,
    pub merchant: Option<String>,
    /// Negative = expense, positive = credit
    pub amount: f64,
    pub location: Option<String>,
    pub pending: bool,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub category_source: Option<CategorySource>,
    /// 0-100 certainty of the automatic category assignment
    pub category_confidence: Option<i64>,
    pub needs_review: bool,
    pub import_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Data for inserting a new transaction (before categorization)
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub provider_txn_id: Option<String>,
    pub date: NaiveDate,
    pub posted_at: Option<NaiveDateTime>,
    pub description: String,
    pub merchant: Option<String>,
    pub amount: f64,
    pub location: Option<String>,
    pub pending: bool,
    pub import_hash: String,
    /// Raw provider payload as JSON, kept for audit/debug
    pub original_data: Option<String>,
}

/// A spending category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// How a category was assigned to a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorySource {
    /// Matched by a user-defined rule
    Rule,
    /// Matched by a merchant keyword pattern
    MerchantPattern,
    /// Mapped from the aggregator-provided category
    Provider,
    /// Classified by the LLM fallback
    Llm,
    /// Manually set by the user
    Manual,
    /// Nothing matched; assigned Uncategorized
    Fallback,
}

impl CategorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::MerchantPattern => "merchant_pattern",
            Self::Provider => "provider",
            Self::Llm => "llm",
            Self::Manual => "manual",
            Self::Fallback => "fallback",
        }
    }
}

impl std::str::FromStr for CategorySource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rule" => Ok(Self::Rule),
            "merchant_pattern" => Ok(Self::MerchantPattern),
            "provider" => Ok(Self::Provider),
            "llm" => Ok(Self::Llm),
            "manual" => Ok(Self::Manual),
            "fallback" => Ok(Self::Fallback),
            _ => Err(format!("Unknown category source: {}", s)),
        }
    }
}

impl std::fmt::Display for CategorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pattern matching type for category rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    /// Case-insensitive substring match; pipe-separated alternatives
    Contains,
    /// Case-insensitive regular expression
    Regex,
    /// Exact match (case-insensitive)
    Exact,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Regex => "regex",
            Self::Exact => "exact",
        }
    }
}

impl std::str::FromStr for PatternType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contains" => Ok(Self::Contains),
            "regex" => Ok(Self::Regex),
            "exact" => Ok(Self::Exact),
            _ => Err(format!("Unknown pattern type: {}", s)),
        }
    }
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user-defined categorization rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    pub id: i64,
    pub category_id: i64,
    pub pattern: String,
    pub pattern_type: PatternType,
    /// Higher priority rules are checked first
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

/// A merchant keyword mapped to a category (seeded, user-extensible)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantPattern {
    pub id: i64,
    pub keyword: String,
    pub category_id: i64,
    pub created_at: DateTime<Utc>,
}

/// A budget: spending limit for a category over a date range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: i64,
    pub category_id: i64,
    pub limit_amount: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Percent of the limit at which a warning alert fires
    pub alert_threshold_pct: f64,
    pub created_at: DateTime<Utc>,
}

/// Data for creating a budget
#[derive(Debug, Clone, Deserialize)]
pub struct NewBudget {
    pub category_id: i64,
    pub limit_amount: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold_pct: f64,
}

fn default_alert_threshold() -> f64 {
    80.0
}

/// Budget progress status relative to the alert threshold and limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetStatus {
    /// Below the alert threshold
    Ok,
    /// At or above the alert threshold, under the limit
    Warning,
    /// At or above the limit
    Exceeded,
}

impl BudgetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Exceeded => "exceeded",
        }
    }
}

impl std::str::FromStr for BudgetStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ok" => Ok(Self::Ok),
            "warning" => Ok(Self::Warning),
            "exceeded" => Ok(Self::Exceeded),
            _ => Err(format!("Unknown budget status: {}", s)),
        }
    }
}

impl std::fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An alert raised when a budget crosses its threshold or limit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetAlert {
    pub id: i64,
    pub budget_id: i64,
    pub level: BudgetStatus,
    pub message: String,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

/// Kinds of fraud heuristic alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudAlertType {
    /// Amount far above the account's 30-day baseline
    UnusualAmount,
    /// Location outside the account's typical locations
    UnusualLocation,
    /// Too many transactions within a 5-minute window
    Velocity,
}

impl FraudAlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnusualAmount => "unusual_amount",
            Self::UnusualLocation => "unusual_location",
            Self::Velocity => "velocity",
        }
    }

    /// Human-readable label for display
    pub fn label(&self) -> &'static str {
        match self {
            Self::UnusualAmount => "Unusual amount",
            Self::UnusualLocation => "Unusual location",
            Self::Velocity => "Rapid transactions",
        }
    }
}

impl std::str::FromStr for FraudAlertType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unusual_amount" => Ok(Self::UnusualAmount),
            "unusual_location" => Ok(Self::UnusualLocation),
            "velocity" => Ok(Self::Velocity),
            _ => Err(format!("Unknown fraud alert type: {}", s)),
        }
    }
}

impl std::fmt::Display for FraudAlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity of a fraud alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FraudSeverity {
    Low,
    Medium,
    High,
}

impl FraudSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::str::FromStr for FraudSeverity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("Unknown fraud severity: {}", s)),
        }
    }
}

impl std::fmt::Display for FraudSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A flagged transaction with review state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAlert {
    pub id: i64,
    pub transaction_id: i64,
    pub alert_type: FraudAlertType,
    pub severity: FraudSeverity,
    pub message: String,
    pub reviewed: bool,
    pub false_positive: bool,
    pub review_note: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Outcome status of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown sync status: {}", s)),
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A record of one account sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRecord {
    pub id: i64,
    pub account_id: i64,
    pub status: SyncStatus,
    pub fetched: i64,
    pub imported: i64,
    pub updated: i64,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub user: String,
    pub action: String,
    pub target_type: Option<String>,
    pub target_id: Option<i64>,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Dashboard summary statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub account_count: i64,
    pub transaction_count: i64,
    pub needs_review_count: i64,
    pub open_fraud_alerts: i64,
    pub budgets_in_warning: i64,
    pub last_sync_at: Option<DateTime<Utc>>,
}
