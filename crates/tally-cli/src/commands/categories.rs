//! Category, rule, and merchant pattern commands, plus backfill

use anyhow::{bail, Result};
use tally_core::{
    categorize::{CategoryEngine, FALLBACK_CATEGORY},
    db::Database,
    models::PatternType,
    AIClient,
};

pub fn cmd_categories_list(db: &Database) -> Result<()> {
    let categories = db.list_categories()?;

    println!();
    println!("🏷️  Categories");
    println!("   ─────────────────────────────");
    for category in categories {
        println!("   [{}] {}", category.id, category.name);
    }

    Ok(())
}

pub fn cmd_categories_add(db: &Database, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Category name is required");
    }
    if db.get_category_by_name(name)?.is_some() {
        bail!("Category '{}' already exists", name);
    }

    let id = db.create_category(name)?;
    println!("✅ Category [{}] {} created", id, name);
    Ok(())
}

pub fn cmd_categories_delete(db: &Database, id: i64) -> Result<()> {
    let category = db.get_category(id)?;
    if category.name == FALLBACK_CATEGORY {
        bail!("The catch-all category cannot be deleted");
    }
    db.delete_category(id)?;
    println!(
        "✅ Category {} deleted. Its transactions are now uncategorized.",
        category.name
    );
    Ok(())
}

pub fn cmd_rules_list(db: &Database) -> Result<()> {
    let rules = db.list_category_rules()?;

    if rules.is_empty() {
        println!("No rules defined. Add one with:");
        println!("  tally rules add --category Dining --pattern \"COFFEE|CAFE\"");
        return Ok(());
    }

    println!();
    println!("📋 Rules (cascade order)");
    println!("   ─────────────────────────────────────────────────────────────");
    for rule in rules {
        let category = db
            .get_category(rule.category_id)
            .map(|c| c.name)
            .unwrap_or_else(|_| "?".to_string());
        println!(
            "   [{}] p{} {} \"{}\" → {}",
            rule.id, rule.priority, rule.pattern_type, rule.pattern, category
        );
    }

    Ok(())
}

pub fn cmd_rules_add(
    db: &Database,
    category_name: &str,
    pattern: &str,
    pattern_type: &str,
    priority: i32,
) -> Result<()> {
    let Some(category) = db.get_category_by_name(category_name)? else {
        bail!(
            "Category '{}' not found. See 'tally categories list'.",
            category_name
        );
    };
    let pattern_type: PatternType = pattern_type
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let id = db.create_category_rule(category.id, pattern, pattern_type, priority)?;
    println!(
        "✅ Rule [{}] created: {} \"{}\" → {}",
        id, pattern_type, pattern, category.name
    );
    Ok(())
}

pub fn cmd_rules_delete(db: &Database, id: i64) -> Result<()> {
    db.delete_category_rule(id)?;
    println!("✅ Rule {} deleted", id);
    Ok(())
}

pub fn cmd_patterns_list(db: &Database) -> Result<()> {
    let patterns = db.list_merchant_patterns()?;

    println!();
    println!("🏪 Merchant patterns");
    println!("   ─────────────────────────────");
    for pattern in patterns {
        let category = db
            .get_category(pattern.category_id)
            .map(|c| c.name)
            .unwrap_or_else(|_| "?".to_string());
        println!("   [{}] {} → {}", pattern.id, pattern.keyword, category);
    }

    Ok(())
}

pub fn cmd_patterns_add(db: &Database, keyword: &str, category_name: &str) -> Result<()> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        bail!("Keyword is required");
    }
    let Some(category) = db.get_category_by_name(category_name)? else {
        bail!(
            "Category '{}' not found. See 'tally categories list'.",
            category_name
        );
    };

    let id = db.create_merchant_pattern(keyword, category.id)?;
    println!(
        "✅ Pattern [{}] created: {} → {}",
        id,
        keyword.to_uppercase(),
        category.name
    );
    Ok(())
}

pub fn cmd_patterns_delete(db: &Database, id: i64) -> Result<()> {
    db.delete_merchant_pattern(id)?;
    println!("✅ Pattern {} deleted", id);
    Ok(())
}

pub async fn cmd_backfill(db: &Database, all: bool) -> Result<()> {
    let ai = AIClient::from_env();
    if ai.is_none() {
        println!("💡 Tip: Set OLLAMA_HOST to enable LLM categorization");
    }

    if all {
        println!("🔄 Re-categorizing all transactions...");
    } else {
        println!("🔄 Categorizing uncategorized transactions...");
    }

    let engine = CategoryEngine::new(db, ai.as_ref());
    let result = engine.backfill(!all).await?;

    println!();
    println!("📊 Backfill Results");
    println!("   ─────────────────────────────");
    println!("   Processed: {}", result.total);
    println!("   By rule: {}", result.rule);
    println!("   By merchant pattern: {}", result.merchant_pattern);
    println!("   By provider category: {}", result.provider);
    println!("   By LLM: {}", result.llm);
    println!("   Uncategorized: {}", result.fallback);
    if result.needs_review > 0 {
        println!();
        println!(
            "❓ {} transaction(s) flagged for review. See 'tally transactions list --needs-review'.",
            result.needs_review
        );
    }

    Ok(())
}
