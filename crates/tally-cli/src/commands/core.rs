//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `cmd_init` - Initialize the database
//! - `cmd_status` - Database status
//! - `cmd_dashboard` - Summary counts

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::db::{Database, DB_KEY_ENV};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path must be valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let db = open_db(db_path, no_encrypt)?;
    db.seed_defaults().context("Failed to seed defaults")?;
    println!("   Seeded default categories and merchant patterns");

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Link accounts: tally accounts link --public-token TOKEN");
    println!("  2. Sync transactions: tally sync");
    println!("  3. Start web UI: tally serve");

    Ok(())
}

pub fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    use std::fs;

    println!();
    println!("📊 Tally Status");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    if db_path.exists() {
        match open_db(db_path, no_encrypt) {
            Ok(db) => {
                if let Ok(stats) = db.get_dashboard_stats() {
                    println!();
                    println!("   Accounts: {}", stats.account_count);
                    println!("   Transactions: {}", stats.transaction_count);
                    println!("   Needing review: {}", stats.needs_review_count);
                }
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
                if !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                } else if has_key {
                    println!("      (Check if {} is correct)", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    Ok(())
}

pub fn cmd_dashboard(db: &Database) -> Result<()> {
    let stats = db.get_dashboard_stats()?;

    println!();
    println!("╭─────────────────────────────────────────╮");
    println!("│           💰 Tally Dashboard            │");
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!("  Accounts:        {}", stats.account_count);
    println!("  Transactions:    {}", stats.transaction_count);
    if stats.needs_review_count > 0 {
        println!("  🏷️  Needing review: {}", stats.needs_review_count);
    }
    println!();
    println!("  🚨 Open fraud alerts: {}", stats.open_fraud_alerts);
    println!("  📊 Budgets in warning: {}", stats.budgets_in_warning);
    match stats.last_sync_at {
        Some(ts) => println!("  🔄 Last sync: {}", ts.format("%Y-%m-%d %H:%M UTC")),
        None => println!("  🔄 Last sync: never"),
    }
    println!();

    if stats.open_fraud_alerts > 0 {
        println!("  Run 'tally alerts' to see what needs attention.");
    }

    Ok(())
}
