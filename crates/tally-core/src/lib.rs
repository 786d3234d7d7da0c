//! Tally Core Library
//!
//! Shared functionality for the Tally personal finance service:
//! - Database access and migrations (SQLite with SQLCipher encryption)
//! - Aggregator API client (link flow, account and transaction fetch)
//! - Transaction categorization cascade
//! - Budget progress tracking and threshold alerts
//! - Fraud detection heuristics
//! - Account sync engine
//! - CSV export
//! - Pluggable local AI backend for the LLM categorization stage

pub mod aggregator;
pub mod ai;
pub mod budget;
pub mod categorize;
pub mod db;
pub mod error;
pub mod export;
pub mod fraud;
pub mod models;
pub mod sync;

/// Test utilities including mock Ollama server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use aggregator::{
    AggregatorBackend, AggregatorClient, HttpAggregator, MockAggregator, ProviderAccount,
    ProviderTransaction,
};
pub use ai::{AIBackend, AIClient, MockBackend, OllamaBackend, TransactionClassification};
pub use budget::{budget_progress, evaluate_budget_alerts, list_budget_progress, BudgetProgress};
pub use categorize::{
    BackfillResult, CategoryAssignment, CategoryEngine, FALLBACK_CATEGORY, REVIEW_THRESHOLD,
};
pub use db::{Database, TransactionFilter, DB_KEY_ENV};
pub use error::{Error, Result};
pub use export::{budgets_to_csv, transactions_to_csv};
pub use fraud::{FraudAnalyzer, FraudConfig, FraudFinding};
pub use sync::{import_hash, SyncEngine, SyncOutcome};
