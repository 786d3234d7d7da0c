//! Account commands (list, link, unlink, sync)

use anyhow::{bail, Result};
use tally_core::{
    db::Database, AIClient, AggregatorClient, FraudConfig, SyncEngine, SyncOutcome,
};

pub fn cmd_accounts_list(db: &Database, include_unlinked: bool) -> Result<()> {
    let accounts = db.list_accounts(include_unlinked)?;

    if accounts.is_empty() {
        println!("No accounts found. Link accounts with:");
        println!("  tally accounts link --public-token TOKEN");
        return Ok(());
    }

    println!();
    println!("📁 Accounts");
    println!("   ─────────────────────────────────────────────────────────────");

    for account in accounts {
        let mask = account
            .mask
            .as_deref()
            .map(|m| format!(" ····{}", m))
            .unwrap_or_default();
        let synced = match account.last_synced_at {
            Some(ts) => format!("synced {}", ts.format("%Y-%m-%d %H:%M")),
            None => "never synced".to_string(),
        };
        println!(
            "   [{}] {}{} ({}) - {}, {}",
            account.id, account.name, mask, account.institution, account.status, synced
        );
    }

    Ok(())
}

/// Build the aggregator client, or fail with a configuration hint
fn aggregator_from_env() -> Result<AggregatorClient> {
    match AggregatorClient::from_env() {
        Some(client) => Ok(client),
        None => bail!(
            "No aggregator configured. Set AGGREGATOR_HOST, AGGREGATOR_CLIENT_ID, \
             and AGGREGATOR_SECRET (or AGGREGATOR_BACKEND=mock for testing)."
        ),
    }
}

pub async fn cmd_accounts_link(db: &Database, public_token: &str) -> Result<()> {
    let aggregator = aggregator_from_env()?;
    let ai = AIClient::from_env();
    let engine = SyncEngine::new(db, &aggregator, ai.as_ref(), FraudConfig::default());

    println!("🔗 Exchanging public token...");
    let ids = engine.link_accounts(public_token).await?;

    println!("✅ Linked {} account(s):", ids.len());
    for id in ids {
        let account = db.get_account(id)?;
        println!("   [{}] {} ({})", account.id, account.name, account.institution);
    }
    println!();
    println!("Run 'tally sync' to import transactions.");

    Ok(())
}

pub fn cmd_accounts_unlink(db: &Database, id: i64) -> Result<()> {
    let account = db.get_account(id)?;
    db.unlink_account(id)?;
    println!(
        "✅ Unlinked {} ({}). History is kept; the access token was removed.",
        account.name, account.institution
    );
    Ok(())
}

fn print_outcome(outcome: &SyncOutcome) {
    println!(
        "   [{}] fetched {}, imported {}, updated {}, skipped {}",
        outcome.account_id, outcome.fetched, outcome.imported, outcome.updated, outcome.skipped
    );
    if outcome.fraud_alerts > 0 {
        println!("        🚨 {} fraud alert(s) raised", outcome.fraud_alerts);
    }
    if outcome.budget_alerts > 0 {
        println!("        📊 {} budget alert(s) raised", outcome.budget_alerts);
    }
}

pub async fn cmd_sync(db: &Database, account: Option<i64>) -> Result<()> {
    let aggregator = aggregator_from_env()?;
    let ai = AIClient::from_env();
    let engine = SyncEngine::new(db, &aggregator, ai.as_ref(), FraudConfig::default());

    println!("🔄 Syncing...");

    match account {
        Some(id) => {
            let outcome = engine.sync_account(id).await?;
            print_outcome(&outcome);
        }
        None => {
            let results = engine.sync_all().await?;
            if results.is_empty() {
                println!("   No syncable accounts. Link one with 'tally accounts link'.");
                return Ok(());
            }
            let mut failures = 0;
            for (account_id, result) in &results {
                match result {
                    Ok(outcome) => print_outcome(outcome),
                    Err(e) => {
                        failures += 1;
                        println!("   [{}] ❌ {}", account_id, e);
                    }
                }
            }
            if failures > 0 {
                bail!("{} of {} accounts failed to sync", failures, results.len());
            }
        }
    }

    println!("✅ Sync complete.");
    Ok(())
}
