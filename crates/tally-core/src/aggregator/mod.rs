//! Aggregator API client abstraction
//!
//! Tally never talks to banks directly; an external aggregator service owns
//! the institution connections and exposes accounts and transactions over
//! HTTP. This module wraps that API behind a trait so the sync engine and
//! scheduler can run against a deterministic mock in tests.
//!
//! # Architecture
//!
//! - `AggregatorBackend` trait: defines the interface
//! - `AggregatorClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `HttpAggregator`, `MockAggregator`
//!
//! # Configuration
//!
//! Environment variables:
//! - `AGGREGATOR_BACKEND`: Backend to use (http, mock). Default: http
//! - `AGGREGATOR_HOST`: Aggregator API base URL (required for http backend)
//! - `AGGREGATOR_CLIENT_ID`: API client id (required for http backend)
//! - `AGGREGATOR_SECRET`: API secret (required for http backend)

mod http;
mod mock;
mod types;

pub use http::HttpAggregator;
pub use mock::MockAggregator;
pub use types::{ProviderAccount, ProviderTransaction};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;

/// Trait defining the interface for all aggregator backends
#[async_trait]
pub trait AggregatorBackend: Send + Sync {
    /// Create a short-lived link token to start the account-link flow
    async fn create_link_token(&self) -> Result<String>;

    /// Exchange the public token from a completed link flow for an access token
    async fn exchange_public_token(&self, public_token: &str) -> Result<String>;

    /// List the accounts reachable with an access token
    async fn list_accounts(&self, access_token: &str) -> Result<Vec<ProviderAccount>>;

    /// Fetch transactions for one account, optionally only since a date
    async fn fetch_transactions(
        &self,
        access_token: &str,
        provider_account_id: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<ProviderTransaction>>;

    /// Check if the aggregator API is reachable
    async fn health_check(&self) -> bool;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete aggregator client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AggregatorClient {
    /// Real aggregator over HTTP
    Http(HttpAggregator),
    /// Deterministic mock for testing
    Mock(MockAggregator),
}

impl AggregatorClient {
    /// Create an aggregator client from environment variables
    ///
    /// Returns None if the required environment variables are not set; the
    /// server then refuses sync and link operations with a clear error.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AGGREGATOR_BACKEND").unwrap_or_else(|_| "http".to_string());

        match backend.to_lowercase().as_str() {
            "http" => HttpAggregator::from_env().map(AggregatorClient::Http),
            "mock" => Some(AggregatorClient::Mock(MockAggregator::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown AGGREGATOR_BACKEND, falling back to http");
                HttpAggregator::from_env().map(AggregatorClient::Http)
            }
        }
    }

    /// Create an HTTP backend directly
    pub fn http(host: &str, client_id: &str, secret: &str) -> Self {
        AggregatorClient::Http(HttpAggregator::new(host, client_id, secret))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AggregatorClient::Mock(MockAggregator::new())
    }
}

#[async_trait]
impl AggregatorBackend for AggregatorClient {
    async fn create_link_token(&self) -> Result<String> {
        match self {
            AggregatorClient::Http(b) => b.create_link_token().await,
            AggregatorClient::Mock(b) => b.create_link_token().await,
        }
    }

    async fn exchange_public_token(&self, public_token: &str) -> Result<String> {
        match self {
            AggregatorClient::Http(b) => b.exchange_public_token(public_token).await,
            AggregatorClient::Mock(b) => b.exchange_public_token(public_token).await,
        }
    }

    async fn list_accounts(&self, access_token: &str) -> Result<Vec<ProviderAccount>> {
        match self {
            AggregatorClient::Http(b) => b.list_accounts(access_token).await,
            AggregatorClient::Mock(b) => b.list_accounts(access_token).await,
        }
    }

    async fn fetch_transactions(
        &self,
        access_token: &str,
        provider_account_id: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<ProviderTransaction>> {
        match self {
            AggregatorClient::Http(b) => {
                b.fetch_transactions(access_token, provider_account_id, since).await
            }
            AggregatorClient::Mock(b) => {
                b.fetch_transactions(access_token, provider_account_id, since).await
            }
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AggregatorClient::Http(b) => b.health_check().await,
            AggregatorClient::Mock(b) => b.health_check().await,
        }
    }

    fn host(&self) -> &str {
        match self {
            AggregatorClient::Http(b) => b.host(),
            AggregatorClient::Mock(b) => b.host(),
        }
    }
}
