//! Budget commands (list with progress, add, delete)

use anyhow::{bail, Result};
use chrono::NaiveDate;
use tally_core::{
    budget::list_budget_progress,
    db::Database,
    models::{BudgetStatus, NewBudget},
};

pub fn cmd_budgets_list(db: &Database) -> Result<()> {
    let progress = list_budget_progress(db)?;

    if progress.is_empty() {
        println!("No budgets defined. Add one with:");
        println!("  tally budgets add --category Groceries --limit 400 --from 2024-06-01 --to 2024-06-30");
        return Ok(());
    }

    println!();
    println!("💵 Budgets");
    println!("   ─────────────────────────────────────────────────────────────");

    for p in progress {
        let icon = match p.status {
            BudgetStatus::Ok => "✅",
            BudgetStatus::Warning => "⚠️ ",
            BudgetStatus::Exceeded => "🚨",
        };
        println!(
            "   {} [{}] {}: {:.2} / {:.2} ({:.0}%)  {} to {}",
            icon,
            p.budget_id,
            p.category_name,
            p.spent,
            p.limit_amount,
            p.percent_used,
            p.start_date,
            p.end_date
        );
        if p.remaining < 0.0 {
            println!("        Over by {:.2}", -p.remaining);
        }
    }

    Ok(())
}

pub fn cmd_budgets_add(
    db: &Database,
    category_name: &str,
    limit: f64,
    from: NaiveDate,
    to: NaiveDate,
    threshold: f64,
) -> Result<()> {
    let Some(category) = db.get_category_by_name(category_name)? else {
        bail!(
            "Category '{}' not found. See 'tally categories list'.",
            category_name
        );
    };

    let id = db.create_budget(&NewBudget {
        category_id: category.id,
        limit_amount: limit,
        start_date: from,
        end_date: to,
        alert_threshold_pct: threshold,
    })?;

    println!(
        "✅ Budget [{}] created: {} {:.2} for {} to {} (warn at {:.0}%)",
        id, category.name, limit, from, to, threshold
    );
    Ok(())
}

pub fn cmd_budgets_delete(db: &Database, id: i64) -> Result<()> {
    db.get_budget(id)?;
    db.delete_budget(id)?;
    println!("✅ Budget {} deleted", id);
    Ok(())
}
