//! Mock backend for testing
//!
//! Returns deterministic classifications from a small keyword table.
//! Unknown merchants get a category outside any real category set, which
//! the cascade rejects, exercising the fallback path.

use async_trait::async_trait;

use crate::error::Result;

use super::types::TransactionClassification;
use super::AIBackend;

/// Mock AI backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self { healthy: true }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self { healthy: false }
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn classify_transaction(
        &self,
        description: &str,
        merchant: Option<&str>,
        _categories: &[String],
    ) -> Result<TransactionClassification> {
        let text = format!("{} {}", description, merchant.unwrap_or("")).to_uppercase();

        let (category, confidence) = if text.contains("CAFE") || text.contains("COFFEE") {
            ("Dining", Some(90))
        } else if text.contains("GYM") || text.contains("FITNESS") {
            ("Health", Some(80))
        } else if text.contains("PARKING") || text.contains("TOLL") {
            ("Transport", Some(75))
        } else if text.contains("CINEMA") || text.contains("THEATRE") {
            ("Entertainment", None)
        } else {
            ("Unknown", None)
        };

        Ok(TransactionClassification {
            category: category.to_string(),
            confidence,
        })
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
