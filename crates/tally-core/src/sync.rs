//! Account sync engine
//!
//! Pulls transactions from the aggregator, dedupes them against what is
//! already stored, runs the categorization cascade and fraud heuristics over
//! new arrivals, and re-evaluates budgets for the categories that changed.
//! Every run leaves a row in sync_history either way.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::aggregator::{AggregatorBackend, AggregatorClient, ProviderTransaction};
use crate::ai::AIClient;
use crate::budget::evaluate_budget_alerts;
use crate::categorize::CategoryEngine;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::fraud::{FraudAnalyzer, FraudConfig};
use crate::models::{AccountType, NewTransaction, SyncStatus};

/// How far back a sync re-fetches behind the last successful run
///
/// Pending transactions can post days later with changed details.
const SYNC_OVERLAP_DAYS: i64 = 7;

/// Counts from one account sync run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncOutcome {
    pub account_id: i64,
    pub fetched: usize,
    pub imported: usize,
    /// Pending transactions that transitioned to posted
    pub updated: usize,
    pub skipped: usize,
    pub fraud_alerts: usize,
    pub budget_alerts: usize,
}

/// Deterministic dedupe hash for an imported transaction
pub fn import_hash(
    date: NaiveDate,
    description: &str,
    amount: f64,
    provider_txn_id: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(date.to_string().as_bytes());
    hasher.update(description.as_bytes());
    hasher.update(amount.to_be_bytes());
    if let Some(id) = provider_txn_id {
        hasher.update(id.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn hash_of(tx: &ProviderTransaction) -> String {
    import_hash(
        tx.date,
        &tx.description,
        tx.amount,
        Some(&tx.provider_txn_id),
    )
}

/// Orchestrates sync runs against a database and an aggregator
pub struct SyncEngine<'a> {
    db: &'a Database,
    aggregator: &'a AggregatorClient,
    ai: Option<&'a AIClient>,
    fraud_config: FraudConfig,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        db: &'a Database,
        aggregator: &'a AggregatorClient,
        ai: Option<&'a AIClient>,
        fraud_config: FraudConfig,
    ) -> Self {
        Self {
            db,
            aggregator,
            ai,
            fraud_config,
        }
    }

    /// Complete the link flow: exchange the public token, then create a local
    /// account per provider account. Returns the new account ids.
    pub async fn link_accounts(&self, public_token: &str) -> Result<Vec<i64>> {
        let access_token = self.aggregator.exchange_public_token(public_token).await?;
        let provider_accounts = self.aggregator.list_accounts(&access_token).await?;
        if provider_accounts.is_empty() {
            return Err(Error::Aggregator("Link returned no accounts".into()));
        }

        let mut ids = Vec::with_capacity(provider_accounts.len());
        for pa in provider_accounts {
            let account_type = pa
                .account_type
                .as_deref()
                .and_then(|t| t.parse::<AccountType>().ok());
            let id = self.db.create_account(
                &pa.name,
                &pa.institution,
                account_type,
                pa.mask.as_deref(),
                Some(&pa.provider_account_id),
                Some(&access_token),
            )?;
            info!(account_id = id, institution = %pa.institution, "Linked account");
            ids.push(id);
        }
        Ok(ids)
    }

    /// Sync one account, recording the outcome in sync_history
    pub async fn sync_account(&self, account_id: i64) -> Result<SyncOutcome> {
        match self.sync_account_inner(account_id).await {
            Ok(outcome) => {
                self.db.record_sync(
                    account_id,
                    SyncStatus::Success,
                    outcome.fetched as i64,
                    outcome.imported as i64,
                    outcome.updated as i64,
                    None,
                )?;
                self.db.mark_account_synced(account_id, None)?;
                info!(
                    account_id,
                    fetched = outcome.fetched,
                    imported = outcome.imported,
                    updated = outcome.updated,
                    "Sync finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(account_id, error = %e, "Sync failed");
                self.db.record_sync(
                    account_id,
                    SyncStatus::Failed,
                    0,
                    0,
                    0,
                    Some(&e.to_string()),
                )?;
                Err(e)
            }
        }
    }

    async fn sync_account_inner(&self, account_id: i64) -> Result<SyncOutcome> {
        let account = self.db.get_account(account_id)?;
        let access_token = self
            .db
            .get_access_token(account_id)?
            .ok_or_else(|| Error::Sync(format!("Account {} has no access token", account_id)))?;
        let provider_account_id = account.provider_account_id.as_deref().ok_or_else(|| {
            Error::Sync(format!("Account {} has no provider account id", account_id))
        })?;

        let since = account
            .last_synced_at
            .map(|t| t.date_naive() - Duration::days(SYNC_OVERLAP_DAYS));

        let fetched = self
            .aggregator
            .fetch_transactions(&access_token, provider_account_id, since)
            .await?;

        let mut outcome = SyncOutcome {
            account_id,
            fetched: fetched.len(),
            ..Default::default()
        };
        let engine = CategoryEngine::new(self.db, self.ai);
        let analyzer = FraudAnalyzer::new(self.db, self.fraud_config.clone());
        let mut touched_categories: HashSet<i64> = HashSet::new();

        for provider_tx in &fetched {
            let hash = hash_of(provider_tx);

            if let Some((id, stored_pending)) = self.db.find_transaction_by_hash(&hash)? {
                if stored_pending && !provider_tx.pending {
                    // Same details, now posted
                    self.db.mark_transaction_posted(id, provider_tx.posted_at)?;
                    let tx = self.db.get_transaction(id)?;
                    outcome.fraud_alerts += analyzer.analyze_and_record(&tx)?.len();
                    if let Some(category_id) = tx.category_id {
                        touched_categories.insert(category_id);
                    }
                    outcome.updated += 1;
                } else {
                    outcome.skipped += 1;
                }
                continue;
            }

            if let Some((id, stored_pending)) = self
                .db
                .find_transaction_by_provider_id(account_id, &provider_tx.provider_txn_id)?
            {
                if stored_pending && !provider_tx.pending {
                    // Posted with changed details
                    self.db.post_pending_transaction(
                        id,
                        provider_tx.amount,
                        &provider_tx.description,
                        provider_tx.posted_at,
                        &hash,
                    )?;
                    let tx = self.db.get_transaction(id)?;
                    outcome.fraud_alerts += analyzer.analyze_and_record(&tx)?.len();
                    if let Some(category_id) = tx.category_id {
                        touched_categories.insert(category_id);
                    }
                    outcome.updated += 1;
                } else {
                    outcome.skipped += 1;
                }
                continue;
            }

            let original_data = serde_json::to_string(provider_tx)?;
            let id = self.db.insert_transaction(
                account_id,
                &NewTransaction {
                    provider_txn_id: Some(provider_tx.provider_txn_id.clone()),
                    date: provider_tx.date,
                    posted_at: provider_tx.posted_at,
                    description: provider_tx.description.clone(),
                    merchant: provider_tx.merchant.clone(),
                    amount: provider_tx.amount,
                    location: provider_tx.location.clone(),
                    pending: provider_tx.pending,
                    import_hash: hash,
                    original_data: Some(original_data),
                },
            )?;

            let tx = self.db.get_transaction(id)?;
            let assignment = engine.categorize_and_store(&tx).await?;
            touched_categories.insert(assignment.category_id);

            // Fraud heuristics only run against posted transactions
            let tx = self.db.get_transaction(id)?;
            outcome.fraud_alerts += analyzer.analyze_and_record(&tx)?.len();
            outcome.imported += 1;
        }

        if !touched_categories.is_empty() {
            let category_ids: Vec<i64> = touched_categories.into_iter().collect();
            outcome.budget_alerts = evaluate_budget_alerts(self.db, &category_ids)?.len();
        }

        Ok(outcome)
    }

    /// Sync every syncable account, collecting per-account results
    pub async fn sync_all(&self) -> Result<Vec<(i64, Result<SyncOutcome>)>> {
        let accounts = self.db.list_syncable_accounts()?;
        let mut results = Vec::with_capacity(accounts.len());
        for account in accounts {
            let result = self.sync_account(account.id).await;
            results.push((account.id, result));
        }
        Ok(results)
    }
}
