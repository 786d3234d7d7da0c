//! CLI argument definitions using clap
//!
//! This module contains the clap structs and enums for parsing CLI
//! arguments. The command implementations are in the `commands` module.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// Tally - Self-hosted personal finance tracker
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Track accounts, categorize spending, watch budgets", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path (defaults to the platform data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set the TALLY_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Show database status (encryption, size, etc.)
    Status,

    /// Show dashboard summary
    Dashboard,

    /// Manage linked accounts (list, link, unlink)
    Accounts {
        #[command(subcommand)]
        action: Option<AccountsAction>,
    },

    /// List and manage transactions
    Transactions {
        #[command(subcommand)]
        action: Option<TransactionsAction>,
    },

    /// Manage categories (list, add, delete)
    Categories {
        #[command(subcommand)]
        action: Option<CategoriesAction>,
    },

    /// Manage categorization rules (list, add, delete)
    Rules {
        #[command(subcommand)]
        action: Option<RulesAction>,
    },

    /// Manage merchant keyword patterns (list, add, delete)
    Patterns {
        #[command(subcommand)]
        action: Option<PatternsAction>,
    },

    /// Manage budgets (list, add, delete)
    Budgets {
        #[command(subcommand)]
        action: Option<BudgetsAction>,
    },

    /// List fraud and budget alerts
    Alerts {
        /// Include reviewed/resolved alerts
        #[arg(long)]
        all: bool,
    },

    /// Mark a fraud alert reviewed
    Review {
        /// Fraud alert ID
        alert_id: i64,

        /// Record the alert as a false positive
        #[arg(long)]
        false_positive: bool,

        /// Optional review note
        #[arg(long)]
        note: Option<String>,
    },

    /// Sync transactions from the aggregator
    Sync {
        /// Sync a single account instead of all
        #[arg(long)]
        account: Option<i64>,
    },

    /// Re-run the categorization cascade over stored transactions
    Backfill {
        /// Re-evaluate every transaction, not just uncategorized ones
        #[arg(long)]
        all: bool,
    },

    /// Export transactions or budgets to CSV
    Export {
        /// Output file path
        #[arg(short, long)]
        out: PathBuf,

        /// Export budget progress instead of transactions
        #[arg(long)]
        budgets: bool,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a
        /// network. By default, the server requires an API key or a
        /// trusted-network client.
        #[arg(long)]
        no_auth: bool,

        /// Directory containing static files to serve (e.g., ui/dist)
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum AccountsAction {
    /// List accounts
    List {
        /// Include unlinked accounts
        #[arg(long)]
        all: bool,
    },

    /// Link accounts with an aggregator public token
    Link {
        /// Public token from the aggregator link flow
        #[arg(long)]
        public_token: String,
    },

    /// Unlink an account (drops the access token, keeps history)
    Unlink {
        /// Account ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum TransactionsAction {
    /// List recent transactions
    List {
        /// Maximum number to show
        #[arg(short, long, default_value = "20")]
        limit: i64,

        /// Filter by account ID
        #[arg(long)]
        account: Option<i64>,

        /// Only transactions flagged for review
        #[arg(long)]
        needs_review: bool,

        /// Substring search on description or merchant
        #[arg(long)]
        search: Option<String>,
    },

    /// Manually set a transaction's category
    SetCategory {
        /// Transaction ID
        id: i64,
        /// Category name
        category: String,

        /// Also create a contains-rule so future imports match
        #[arg(long)]
        rule: bool,
    },

    /// Accept a low-confidence categorization
    Review {
        /// Transaction ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum CategoriesAction {
    /// List categories
    List,

    /// Add a category
    Add {
        /// Category name
        name: String,
    },

    /// Delete a category (its transactions become uncategorized)
    Delete {
        /// Category ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum RulesAction {
    /// List rules in cascade order
    List,

    /// Add a rule
    Add {
        /// Category name the rule assigns
        #[arg(long)]
        category: String,

        /// Pattern to match against description and merchant
        #[arg(long)]
        pattern: String,

        /// Pattern type: contains, regex, exact
        #[arg(long, default_value = "contains")]
        pattern_type: String,

        /// Higher priority rules are checked first
        #[arg(long, default_value = "0")]
        priority: i32,
    },

    /// Delete a rule
    Delete {
        /// Rule ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum PatternsAction {
    /// List merchant keyword patterns
    List,

    /// Add a merchant keyword pattern
    Add {
        /// Keyword to match in descriptions (stored uppercase)
        #[arg(long)]
        keyword: String,

        /// Category name the pattern assigns
        #[arg(long)]
        category: String,
    },

    /// Delete a merchant keyword pattern
    Delete {
        /// Pattern ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum BudgetsAction {
    /// List budgets with progress
    List,

    /// Add a budget for a category and period
    Add {
        /// Category name
        #[arg(long)]
        category: String,

        /// Spending limit for the period
        #[arg(long)]
        limit: f64,

        /// Period start date (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,

        /// Period end date (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,

        /// Percent of the limit at which a warning fires
        #[arg(long, default_value = "80")]
        threshold: f64,
    },

    /// Delete a budget
    Delete {
        /// Budget ID
        id: i64,
    },
}
