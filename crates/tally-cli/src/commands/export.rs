//! CSV export command

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::{
    db::{Database, TransactionFilter},
    export::{budgets_to_csv, transactions_to_csv},
};

pub fn cmd_export(db: &Database, out: &Path, budgets: bool) -> Result<()> {
    let csv = if budgets {
        budgets_to_csv(db)?
    } else {
        transactions_to_csv(db, &TransactionFilter::default())?
    };

    std::fs::write(out, &csv).with_context(|| format!("Failed to write {}", out.display()))?;

    let rows = csv.lines().count().saturating_sub(1);
    let what = if budgets { "budgets" } else { "transactions" };
    println!("✅ Exported {} {} to {}", rows, what, out.display());
    Ok(())
}
