//! Response parsing for LLM output
//!
//! Models wrap JSON in prose or code fences more often than not, so parsing
//! extracts the first JSON object from the raw response text.

use crate::error::{Error, Result};

use super::types::TransactionClassification;

/// Extract the first JSON object substring from raw model output
fn extract_json(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end > start {
        Some(&response[start..=end])
    } else {
        None
    }
}

/// Parse a classification response
///
/// Expected shape: `{"category": "Dining", "confidence": 85}` with
/// `confidence` optional.
pub fn parse_classification(response: &str) -> Result<TransactionClassification> {
    let json = extract_json(response)
        .ok_or_else(|| Error::InvalidData(format!("No JSON in model response: {}", response)))?;

    let classification: TransactionClassification = serde_json::from_str(json)?;
    if classification.category.trim().is_empty() {
        return Err(Error::InvalidData("Model returned empty category".into()));
    }
    Ok(classification)
}
