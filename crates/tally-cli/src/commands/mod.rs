//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init, status, dashboard, and the shared `open_db` utility
//! - `accounts` - Account listing, linking, unlinking, sync
//! - `transactions` - Transaction listing and categorization
//! - `categories` - Categories, rules, merchant patterns, backfill
//! - `budgets` - Budget management and progress
//! - `alerts` - Fraud and budget alert listing and review
//! - `export` - CSV export
//! - `serve` - Web server command

pub mod accounts;
pub mod alerts;
pub mod budgets;
pub mod categories;
pub mod core;
pub mod export;
pub mod serve;
pub mod transactions;

// Re-export command functions for main.rs
pub use accounts::*;
pub use alerts::*;
pub use budgets::*;
pub use categories::*;
pub use core::*;
pub use export::*;
pub use serve::*;
pub use transactions::*;

/// Truncate a string to a maximum character count, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    let keep = max.saturating_sub(3);
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some(_) => {
            let cut = s
                .char_indices()
                .nth(keep)
                .map(|(i, _)| i)
                .unwrap_or(s.len());
            format!("{}...", &s[..cut])
        }
    }
}
