//! Ollama backend implementation

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

use super::parsing::parse_classification;
use super::types::TransactionClassification;
use super::AIBackend;

/// Ollama backend (HTTP API against a local Ollama server)
#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OLLAMA_HOST").ok()?;
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        Some(Self::new(&host, &model))
    }

    fn build_prompt(description: &str, merchant: Option<&str>, categories: &[String]) -> String {
        let merchant_line = merchant
            .map(|m| format!("Merchant: {}\n", m))
            .unwrap_or_default();
        format!(
            "Classify this bank transaction into exactly one of the listed categories.\n\
             Description: {}\n\
             {}Categories: {}\n\
             Respond with JSON only: {{\"category\": \"<name>\", \"confidence\": <0-100>}}",
            description,
            merchant_line,
            categories.join(", ")
        )
    }
}

/// Request to Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
}

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl AIBackend for OllamaBackend {
    async fn classify_transaction(
        &self,
        description: &str,
        merchant: Option<&str>,
        categories: &[String],
    ) -> Result<TransactionClassification> {
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: Self::build_prompt(description, merchant, categories),
            stream: false,
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let ollama_response: OllamaResponse = response.json().await?;
        debug!("Ollama classification response: {}", ollama_response.response);

        parse_classification(&ollama_response.response)
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_includes_categories() {
        let prompt = OllamaBackend::build_prompt(
            "SQ *COFFEE BAR",
            Some("Coffee Bar"),
            &["Dining".to_string(), "Shopping".to_string()],
        );
        assert!(prompt.contains("SQ *COFFEE BAR"));
        assert!(prompt.contains("Merchant: Coffee Bar"));
        assert!(prompt.contains("Dining, Shopping"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let backend = OllamaBackend::new("http://localhost:11434/", "llama3.2");
        assert_eq!(backend.host(), "http://localhost:11434");
    }
}
