//! Mock aggregator backend for testing
//!
//! Serves a fixed pair of accounts and whatever transactions the test queues
//! up. Clones share state, so a handle kept by the test can reconfigure a
//! client already handed to the sync engine or scheduler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{Error, Result};

use super::types::{ProviderAccount, ProviderTransaction};
use super::AggregatorBackend;

#[derive(Default)]
struct MockState {
    /// Transactions per provider account id
    transactions: HashMap<String, Vec<ProviderTransaction>>,
}

/// Mock aggregator backend for testing
#[derive(Clone, Default)]
pub struct MockAggregator {
    state: Arc<Mutex<MockState>>,
    failing: Arc<AtomicBool>,
    token_counter: Arc<AtomicU64>,
}

impl MockAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue transactions to be served for an account
    pub fn set_transactions(&self, provider_account_id: &str, transactions: Vec<ProviderTransaction>) {
        if let Ok(mut state) = self.state.lock() {
            state
                .transactions
                .insert(provider_account_id.to_string(), transactions);
        }
    }

    /// Make fetch and link calls fail until cleared (for retry tests)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn fail_if_configured(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Aggregator("Mock aggregator set to fail".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AggregatorBackend for MockAggregator {
    async fn create_link_token(&self) -> Result<String> {
        self.fail_if_configured()?;
        let n = self.token_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("link-mock-{}", n))
    }

    async fn exchange_public_token(&self, public_token: &str) -> Result<String> {
        self.fail_if_configured()?;
        if public_token.is_empty() {
            return Err(Error::Aggregator("Empty public token".into()));
        }
        Ok(format!("access-mock-{}", public_token))
    }

    async fn list_accounts(&self, _access_token: &str) -> Result<Vec<ProviderAccount>> {
        self.fail_if_configured()?;
        Ok(vec![
            ProviderAccount {
                provider_account_id: "mock-checking-1".to_string(),
                name: "Everyday Checking".to_string(),
                institution: "Mock Bank".to_string(),
                account_type: Some("checking".to_string()),
                mask: Some("4321".to_string()),
            },
            ProviderAccount {
                provider_account_id: "mock-credit-1".to_string(),
                name: "Rewards Card".to_string(),
                institution: "Mock Bank".to_string(),
                account_type: Some("credit".to_string()),
                mask: Some("9876".to_string()),
            },
        ])
    }

    async fn fetch_transactions(
        &self,
        _access_token: &str,
        provider_account_id: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<ProviderTransaction>> {
        self.fail_if_configured()?;
        let state = self
            .state
            .lock()
            .map_err(|_| Error::Aggregator("Mock state lock poisoned".into()))?;
        let mut transactions = state
            .transactions
            .get(provider_account_id)
            .cloned()
            .unwrap_or_default();
        if let Some(since) = since {
            transactions.retain(|t| t.date >= since);
        }
        Ok(transactions)
    }

    async fn health_check(&self) -> bool {
        !self.failing.load(Ordering::SeqCst)
    }

    fn host(&self) -> &str {
        "mock://aggregator"
    }
}
