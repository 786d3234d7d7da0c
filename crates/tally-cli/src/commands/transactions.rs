//! Transaction commands (list, set-category, review)

use anyhow::{bail, Result};
use tally_core::{
    db::{Database, TransactionFilter},
    models::{CategorySource, PatternType},
};

use super::truncate;

pub fn cmd_transactions_list(
    db: &Database,
    limit: i64,
    account: Option<i64>,
    needs_review: bool,
    search: Option<&str>,
) -> Result<()> {
    let filter = TransactionFilter {
        account_id: account,
        needs_review: needs_review.then_some(true),
        search: search.map(str::to_string),
        limit: Some(limit),
        ..Default::default()
    };
    let transactions = db.list_transactions(&filter)?;

    if transactions.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    println!();
    println!("💳 Transactions");
    println!("   ─────────────────────────────────────────────────────────────");

    for tx in transactions {
        let category = tx.category_name.as_deref().unwrap_or("-");
        let review = if tx.needs_review { " ❓" } else { "" };
        let pending = if tx.pending { " (pending)" } else { "" };
        println!(
            "   [{}] {} {:>10.2}  {:<32} {}{}{}",
            tx.id,
            tx.date,
            tx.amount,
            truncate(&tx.description, 32),
            category,
            review,
            pending
        );
    }

    Ok(())
}

pub fn cmd_transactions_set_category(
    db: &Database,
    id: i64,
    category_name: &str,
    create_rule: bool,
) -> Result<()> {
    let tx = db.get_transaction(id)?;
    let Some(category) = db.get_category_by_name(category_name)? else {
        bail!(
            "Category '{}' not found. See 'tally categories list'.",
            category_name
        );
    };

    db.set_transaction_category(id, category.id, CategorySource::Manual, 100, false)?;
    println!("✅ Transaction {} categorized as {}", id, category.name);

    if create_rule {
        let pattern = tx.merchant.as_deref().unwrap_or(&tx.description);
        db.create_category_rule(category.id, pattern, PatternType::Contains, 10)?;
        println!("   Rule created: \"{}\" → {}", pattern, category.name);
    }

    Ok(())
}

pub fn cmd_transactions_review(db: &Database, id: i64) -> Result<()> {
    db.get_transaction(id)?;
    db.clear_needs_review(id)?;
    println!("✅ Transaction {} marked reviewed", id);
    Ok(())
}
