//! Tally CLI - Self-hosted personal finance tracker
//!
//! Usage:
//!   tally init                        Initialize database
//!   tally accounts link --public-token TOKEN
//!   tally sync                        Pull transactions from the aggregator
//!   tally serve --port 3000           Start web server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let db_path = cli.db.unwrap_or_else(tally_core::db::default_db_path);

    match cli.command {
        Commands::Init => commands::cmd_init(&db_path, cli.no_encrypt),
        Commands::Status => commands::cmd_status(&db_path, cli.no_encrypt),
        Commands::Dashboard => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            commands::cmd_dashboard(&db)
        }
        Commands::Accounts { action } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            match action {
                None => commands::cmd_accounts_list(&db, false),
                Some(AccountsAction::List { all }) => commands::cmd_accounts_list(&db, all),
                Some(AccountsAction::Link { public_token }) => {
                    commands::cmd_accounts_link(&db, &public_token).await
                }
                Some(AccountsAction::Unlink { id }) => commands::cmd_accounts_unlink(&db, id),
            }
        }
        Commands::Transactions { action } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            match action {
                None => commands::cmd_transactions_list(&db, 20, None, false, None),
                Some(TransactionsAction::List {
                    limit,
                    account,
                    needs_review,
                    search,
                }) => commands::cmd_transactions_list(
                    &db,
                    limit,
                    account,
                    needs_review,
                    search.as_deref(),
                ),
                Some(TransactionsAction::SetCategory { id, category, rule }) => {
                    commands::cmd_transactions_set_category(&db, id, &category, rule)
                }
                Some(TransactionsAction::Review { id }) => {
                    commands::cmd_transactions_review(&db, id)
                }
            }
        }
        Commands::Categories { action } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            match action {
                None | Some(CategoriesAction::List) => commands::cmd_categories_list(&db),
                Some(CategoriesAction::Add { name }) => commands::cmd_categories_add(&db, &name),
                Some(CategoriesAction::Delete { id }) => commands::cmd_categories_delete(&db, id),
            }
        }
        Commands::Rules { action } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            match action {
                None | Some(RulesAction::List) => commands::cmd_rules_list(&db),
                Some(RulesAction::Add {
                    category,
                    pattern,
                    pattern_type,
                    priority,
                }) => commands::cmd_rules_add(&db, &category, &pattern, &pattern_type, priority),
                Some(RulesAction::Delete { id }) => commands::cmd_rules_delete(&db, id),
            }
        }
        Commands::Patterns { action } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            match action {
                None | Some(PatternsAction::List) => commands::cmd_patterns_list(&db),
                Some(PatternsAction::Add { keyword, category }) => {
                    commands::cmd_patterns_add(&db, &keyword, &category)
                }
                Some(PatternsAction::Delete { id }) => commands::cmd_patterns_delete(&db, id),
            }
        }
        Commands::Budgets { action } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            match action {
                None | Some(BudgetsAction::List) => commands::cmd_budgets_list(&db),
                Some(BudgetsAction::Add {
                    category,
                    limit,
                    from,
                    to,
                    threshold,
                }) => commands::cmd_budgets_add(&db, &category, limit, from, to, threshold),
                Some(BudgetsAction::Delete { id }) => commands::cmd_budgets_delete(&db, id),
            }
        }
        Commands::Alerts { all } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            commands::cmd_alerts(&db, all)
        }
        Commands::Review {
            alert_id,
            false_positive,
            note,
        } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            commands::cmd_review(&db, alert_id, false_positive, note.as_deref())
        }
        Commands::Sync { account } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            commands::cmd_sync(&db, account).await
        }
        Commands::Backfill { all } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            commands::cmd_backfill(&db, all).await
        }
        Commands::Export { out, budgets } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            commands::cmd_export(&db, &out, budgets)
        }
        Commands::Serve {
            port,
            host,
            no_auth,
            static_dir,
        } => {
            commands::cmd_serve(
                &db_path,
                &host,
                port,
                no_auth,
                cli.no_encrypt,
                static_dir.as_deref(),
            )
            .await
        }
    }
}
