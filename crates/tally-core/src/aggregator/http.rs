//! HTTP aggregator backend
//!
//! Speaks a small JSON API: client id and secret ride in every request body,
//! the way link-based aggregators expect.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

use super::types::{ProviderAccount, ProviderTransaction};
use super::AggregatorBackend;

/// Aggregator backend over HTTP
#[derive(Clone)]
pub struct HttpAggregator {
    http_client: Client,
    base_url: String,
    client_id: String,
    secret: String,
}

impl HttpAggregator {
    /// Create a new HTTP backend
    pub fn new(base_url: &str, client_id: &str, secret: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            secret: secret.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("AGGREGATOR_HOST").ok()?;
        let client_id = std::env::var("AGGREGATOR_CLIENT_ID").ok()?;
        let secret = std::env::var("AGGREGATOR_SECRET").ok()?;
        Some(Self::new(&host, &client_id, &secret))
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let response = self
            .http_client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        response.json().await.map_err(Into::into)
    }
}

#[derive(Serialize)]
struct AuthOnlyRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
}

#[derive(Deserialize)]
struct LinkTokenResponse {
    link_token: String,
}

#[derive(Serialize)]
struct ExchangeRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
    public_token: &'a str,
}

#[derive(Deserialize)]
struct ExchangeResponse {
    access_token: String,
}

#[derive(Serialize)]
struct AccountsRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
    access_token: &'a str,
}

#[derive(Deserialize)]
struct AccountsResponse {
    accounts: Vec<ProviderAccount>,
}

#[derive(Serialize)]
struct TransactionsRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
    access_token: &'a str,
    account_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<String>,
}

#[derive(Deserialize)]
struct TransactionsResponse {
    transactions: Vec<ProviderTransaction>,
}

#[async_trait]
impl AggregatorBackend for HttpAggregator {
    async fn create_link_token(&self) -> Result<String> {
        let response: LinkTokenResponse = self
            .post_json(
                "/link/token/create",
                &AuthOnlyRequest {
                    client_id: &self.client_id,
                    secret: &self.secret,
                },
            )
            .await?;
        Ok(response.link_token)
    }

    async fn exchange_public_token(&self, public_token: &str) -> Result<String> {
        let response: ExchangeResponse = self
            .post_json(
                "/item/public_token/exchange",
                &ExchangeRequest {
                    client_id: &self.client_id,
                    secret: &self.secret,
                    public_token,
                },
            )
            .await?;
        Ok(response.access_token)
    }

    async fn list_accounts(&self, access_token: &str) -> Result<Vec<ProviderAccount>> {
        let response: AccountsResponse = self
            .post_json(
                "/accounts/get",
                &AccountsRequest {
                    client_id: &self.client_id,
                    secret: &self.secret,
                    access_token,
                },
            )
            .await?;
        Ok(response.accounts)
    }

    async fn fetch_transactions(
        &self,
        access_token: &str,
        provider_account_id: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<ProviderTransaction>> {
        let response: TransactionsResponse = self
            .post_json(
                "/transactions/get",
                &TransactionsRequest {
                    client_id: &self.client_id,
                    secret: &self.secret,
                    access_token,
                    account_id: provider_account_id,
                    start_date: since.map(|d| d.to_string()),
                },
            )
            .await?;
        debug!(
            account = provider_account_id,
            count = response.transactions.len(),
            "Fetched transactions from aggregator"
        );
        Ok(response.transactions)
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let backend = HttpAggregator::new("https://sandbox.example.com/", "id", "secret");
        assert_eq!(backend.host(), "https://sandbox.example.com");
    }
}
