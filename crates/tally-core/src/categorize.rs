//! Transaction categorization cascade
//!
//! Every imported transaction is assigned a `(category, confidence)` pair by
//! walking a strict priority cascade; the first stage that produces a category
//! wins:
//!
//! 1. User rules (`category_rules`, priority order) - confidence 100
//! 2. Merchant keyword patterns (`merchant_patterns`) - confidence 85
//! 3. Aggregator-provided category, mapped to a local one - confidence 75
//! 4. LLM fallback (optional, cached per merchant) - model confidence, default 70
//! 5. Default "Uncategorized" - confidence 0
//!
//! Confidence below [`REVIEW_THRESHOLD`] flags the transaction for manual review.

use std::collections::HashMap;
use std::sync::Mutex;

use regex::RegexBuilder;
use serde::Serialize;
use tracing::{debug, warn};

use crate::ai::{AIBackend, AIClient};
use crate::db::Database;
use crate::error::Result;
use crate::models::{CategorySource, PatternType, Transaction};

/// Confidence below this flags the transaction for manual review
pub const REVIEW_THRESHOLD: i64 = 70;

/// Confidence assigned when a user rule matches
pub const RULE_CONFIDENCE: i64 = 100;

/// Confidence assigned when a merchant keyword pattern matches
pub const MERCHANT_PATTERN_CONFIDENCE: i64 = 85;

/// Confidence assigned when the aggregator category maps to a local one
pub const PROVIDER_CONFIDENCE: i64 = 75;

/// Confidence assumed when the LLM does not report its own
pub const LLM_DEFAULT_CONFIDENCE: i64 = 70;

/// Name of the catch-all category
pub const FALLBACK_CATEGORY: &str = "Uncategorized";

/// A category assignment produced by the cascade
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryAssignment {
    pub category_id: i64,
    pub category_name: String,
    pub source: CategorySource,
    /// 0-100
    pub confidence: i64,
}

impl CategoryAssignment {
    /// Whether this assignment should be flagged for manual review
    pub fn needs_review(&self) -> bool {
        self.confidence < REVIEW_THRESHOLD
    }
}

/// Counts from a backfill run, broken down by cascade stage
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillResult {
    pub total: usize,
    pub rule: usize,
    pub merchant_pattern: usize,
    pub provider: usize,
    pub llm: usize,
    pub fallback: usize,
    pub needs_review: usize,
}

impl BackfillResult {
    fn record(&mut self, assignment: &CategoryAssignment) {
        self.total += 1;
        match assignment.source {
            CategorySource::Rule => self.rule += 1,
            CategorySource::MerchantPattern => self.merchant_pattern += 1,
            CategorySource::Provider => self.provider += 1,
            CategorySource::Llm => self.llm += 1,
            CategorySource::Fallback => self.fallback += 1,
            CategorySource::Manual => {}
        }
        if assignment.needs_review() {
            self.needs_review += 1;
        }
    }
}

/// Aggregator category -> local category name
///
/// Keys are normalized to UPPER_SNAKE before lookup, so both
/// "FOOD_AND_DRINK" and "Food and Drink" resolve.
const PROVIDER_CATEGORY_MAP: &[(&str, &str)] = &[
    ("FOOD_AND_DRINK", "Dining"),
    ("RESTAURANTS", "Dining"),
    ("GROCERIES", "Groceries"),
    ("SUPERMARKETS", "Groceries"),
    ("TRANSPORTATION", "Transport"),
    ("GAS_STATIONS", "Transport"),
    ("TRAVEL", "Travel"),
    ("AIRLINES", "Travel"),
    ("LODGING", "Travel"),
    ("ENTERTAINMENT", "Entertainment"),
    ("RECREATION", "Entertainment"),
    ("GENERAL_MERCHANDISE", "Shopping"),
    ("SHOPS", "Shopping"),
    ("SUBSCRIPTION", "Subscriptions"),
    ("MEDICAL", "Health"),
    ("HEALTHCARE", "Health"),
    ("RENT_AND_UTILITIES", "Utilities"),
    ("UTILITIES", "Utilities"),
    ("INCOME", "Income"),
    ("TRANSFER_IN", "Income"),
    ("BANK_FEES", "Fees"),
    ("INTEREST", "Fees"),
];

/// Map an aggregator category string to a local category name
pub fn map_provider_category(provider_category: &str) -> Option<&'static str> {
    let key: String = provider_category
        .trim()
        .to_uppercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    PROVIDER_CATEGORY_MAP
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
}

/// Check if text matches a rule pattern
///
/// - `Contains`: case-insensitive substring; pipe-separated alternatives (OR)
/// - `Regex`: case-insensitive regular expression; invalid patterns never match
/// - `Exact`: case-insensitive full-string equality
pub fn pattern_matches(text: &str, pattern: &str, pattern_type: PatternType) -> bool {
    match pattern_type {
        PatternType::Contains => {
            let upper = text.to_uppercase();
            pattern
                .split('|')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .any(|p| upper.contains(&p.to_uppercase()))
        }
        PatternType::Regex => match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => re.is_match(text),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Skipping invalid regex rule");
                false
            }
        },
        PatternType::Exact => text.trim().eq_ignore_ascii_case(pattern.trim()),
    }
}

/// Normalize a merchant/description into a cache key
///
/// Uppercases, drops store-number tokens, and collapses whitespace so
/// "STARBUCKS #1234" and "Starbucks  #99" share one LLM answer.
pub fn normalize_merchant_key(s: &str) -> String {
    s.to_uppercase()
        .split_whitespace()
        .filter(|tok| !tok.starts_with('#') && !tok.chars().all(|c| c.is_ascii_digit()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// The categorization cascade engine
///
/// Holds a per-engine cache of LLM answers keyed by normalized merchant, so a
/// sync run asks the model at most once per merchant.
pub struct CategoryEngine<'a> {
    db: &'a Database,
    ai: Option<&'a AIClient>,
    llm_cache: Mutex<HashMap<String, Option<CategoryAssignment>>>,
}

impl<'a> CategoryEngine<'a> {
    pub fn new(db: &'a Database, ai: Option<&'a AIClient>) -> Self {
        Self {
            db,
            ai,
            llm_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Run the cascade for one transaction's fields
    pub async fn categorize(
        &self,
        description: &str,
        merchant: Option<&str>,
        provider_category: Option<&str>,
    ) -> Result<CategoryAssignment> {
        // 1. User rules, highest priority first
        for rule in self.db.list_category_rules()? {
            let matched = pattern_matches(description, &rule.pattern, rule.pattern_type)
                || merchant
                    .map(|m| pattern_matches(m, &rule.pattern, rule.pattern_type))
                    .unwrap_or(false);
            if matched {
                let category = self.db.get_category(rule.category_id)?;
                debug!(rule_id = rule.id, category = %category.name, "Rule match");
                return Ok(CategoryAssignment {
                    category_id: category.id,
                    category_name: category.name,
                    source: CategorySource::Rule,
                    confidence: RULE_CONFIDENCE,
                });
            }
        }

        // 2. Merchant keyword patterns
        let haystack = format!(
            "{} {}",
            description.to_uppercase(),
            merchant.unwrap_or("").to_uppercase()
        );
        for pattern in self.db.list_merchant_patterns()? {
            if haystack.contains(&pattern.keyword.to_uppercase()) {
                let category = self.db.get_category(pattern.category_id)?;
                debug!(keyword = %pattern.keyword, category = %category.name, "Merchant pattern match");
                return Ok(CategoryAssignment {
                    category_id: category.id,
                    category_name: category.name,
                    source: CategorySource::MerchantPattern,
                    confidence: MERCHANT_PATTERN_CONFIDENCE,
                });
            }
        }

        // 3. Aggregator-provided category
        if let Some(provider_cat) = provider_category {
            if let Some(local_name) = map_provider_category(provider_cat) {
                if let Some(category) = self.db.get_category_by_name(local_name)? {
                    debug!(provider = %provider_cat, category = %category.name, "Provider category match");
                    return Ok(CategoryAssignment {
                        category_id: category.id,
                        category_name: category.name,
                        source: CategorySource::Provider,
                        confidence: PROVIDER_CONFIDENCE,
                    });
                }
            }
        }

        // 4. LLM fallback, cached per normalized merchant
        if let Some(assignment) = self.classify_with_llm(description, merchant).await? {
            return Ok(assignment);
        }

        // 5. Default
        let fallback = self
            .db
            .get_category_by_name(FALLBACK_CATEGORY)?
            .map(Ok)
            .unwrap_or_else(|| {
                // Catch-all must exist even on an unseeded database
                let id = self.db.create_category(FALLBACK_CATEGORY)?;
                self.db.get_category(id)
            })?;
        Ok(CategoryAssignment {
            category_id: fallback.id,
            category_name: fallback.name,
            source: CategorySource::Fallback,
            confidence: 0,
        })
    }

    /// Run the cascade and persist the assignment on the transaction
    pub async fn categorize_and_store(&self, tx: &Transaction) -> Result<CategoryAssignment> {
        let provider_category = self.provider_category_of(tx);
        let assignment = self
            .categorize(&tx.description, tx.merchant.as_deref(), provider_category.as_deref())
            .await?;
        self.db.set_transaction_category(
            tx.id,
            assignment.category_id,
            assignment.source,
            assignment.confidence,
            assignment.needs_review(),
        )?;
        Ok(assignment)
    }

    /// Re-run the cascade over stored transactions
    ///
    /// With `only_uncategorized` false, every transaction is re-evaluated
    /// (used after rule changes).
    pub async fn backfill(&self, only_uncategorized: bool) -> Result<BackfillResult> {
        let transactions = self.db.list_transactions_for_backfill(only_uncategorized)?;
        let mut result = BackfillResult::default();
        for tx in &transactions {
            let assignment = self.categorize_and_store(tx).await?;
            result.record(&assignment);
        }
        Ok(result)
    }

    /// Pull the raw provider category back out of the stored payload
    fn provider_category_of(&self, tx: &Transaction) -> Option<String> {
        let conn = self.db.conn().ok()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT original_data FROM transactions WHERE id = ?1",
                [tx.id],
                |row| row.get(0),
            )
            .ok()?;
        let value: serde_json::Value = serde_json::from_str(&raw?).ok()?;
        value
            .get("category")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    async fn classify_with_llm(
        &self,
        description: &str,
        merchant: Option<&str>,
    ) -> Result<Option<CategoryAssignment>> {
        let Some(ai) = self.ai else {
            return Ok(None);
        };

        let cache_key = normalize_merchant_key(merchant.unwrap_or(description));
        {
            let cache = self
                .llm_cache
                .lock()
                .map_err(|_| crate::error::Error::InvalidData("LLM cache lock poisoned".into()))?;
            if let Some(cached) = cache.get(&cache_key) {
                return Ok(cached.clone());
            }
        }

        let categories: Vec<String> = self
            .db
            .list_categories()?
            .into_iter()
            .map(|c| c.name)
            .collect();

        let answer = match ai
            .classify_transaction(description, merchant, &categories)
            .await
        {
            Ok(classification) => {
                // Reject category names outside the known set
                match self.db.get_category_by_name(&classification.category)? {
                    Some(category) => {
                        let confidence = classification
                            .confidence
                            .unwrap_or(LLM_DEFAULT_CONFIDENCE)
                            .clamp(0, 100);
                        Some(CategoryAssignment {
                            category_id: category.id,
                            category_name: category.name,
                            source: CategorySource::Llm,
                            confidence,
                        })
                    }
                    None => {
                        warn!(category = %classification.category, "LLM returned unknown category");
                        None
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "LLM classification failed");
                None
            }
        };

        let mut cache = self
            .llm_cache
            .lock()
            .map_err(|_| crate::error::Error::InvalidData("LLM cache lock poisoned".into()))?;
        cache.insert(cache_key, answer.clone());
        Ok(answer)
    }
}
