//! Generative re-ranking provider.
//!
//! The reranker is strictly optional: it is called with a bounded
//! timeout, and anything other than a parseable JSON array comes back
//! as `Ok(None)` so the caller can fall back to the heuristic order.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::domain::FlightRecord;

/// One entry of the fixed response schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankedEntry {
    #[serde(default)]
    pub flight_number: String,
    #[serde(default)]
    pub airline_name: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub departure_time: String,
    #[serde(default)]
    pub arrival_time: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub load_summary: String,
    #[serde(default)]
    pub source_notes: String,
}

/// External generative-model ranking collaborator
#[async_trait]
pub trait Reranker: Send + Sync {
    /// `Ok(None)` means "no usable ranking" and must be treated as a
    /// soft miss, not an error.
    async fn rerank(
        &self,
        candidates: &[FlightRecord],
        route: &str,
    ) -> Result<Option<Vec<RerankedEntry>>>;
}

/// Reranker backed by a generateContent-style HTTP endpoint
pub struct HttpReranker {
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpReranker {
    pub fn new(endpoint: String, model: String, api_key: String, timeout: Duration) -> Self {
        Self {
            endpoint,
            model,
            api_key,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    fn request_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.endpoint.trim_end_matches('/'),
            self.model,
            self.api_key
        )
    }

    fn build_prompt(candidates: &[FlightRecord], route: &str) -> String {
        let payload = serde_json::to_string(candidates).unwrap_or_else(|_| "[]".to_string());
        format!(
            "Context: I am a frequent user of staff travel benefits. \
             I am providing a JSON payload of selectable flights from a staff \
             booking portal, augmented with seat availability from a public \
             fare search and a peer load-sharing network.\n\n\
             Task: Analyze the payload to identify the top 5 flight options \
             for the route {route}.\n\n\
             Requirements:\n\
             1. Use seat availability across sources to rank the top 5 flights. \
             If sources disagree, prefer peer loads for staff availability and \
             the fare search for public seats.\n\
             2. Output format: Return a JSON array of 5 objects with keys: \
             flight_number, airline_name, origin, destination, departure_time, \
             arrival_time, date, load_summary, and source_notes.\n\
             3. Be concise and return only JSON.\n\n\
             Flight payload JSON:\n{payload}\n"
        )
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        candidates: &[FlightRecord],
        route: &str,
    ) -> Result<Option<Vec<RerankedEntry>>> {
        if self.api_key.is_empty() {
            anyhow::bail!("reranker api key is not configured");
        }

        let prompt = Self::build_prompt(candidates, route);
        info!(route, prompt_chars = prompt.len(), "reranker: sending request");

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.2 },
        });

        let response = self
            .client
            .post(self.request_url())
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("reranker request failed")?
            .error_for_status()
            .context("reranker returned an error status")?;

        let data: Value = response
            .json()
            .await
            .context("reranker response is not JSON")?;

        let text = data["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default();
        debug!(chars = text.len(), "reranker: received response");

        Ok(parse_reranked_entries(text))
    }
}

/// Parse the model's text into ranked entries, or None when it is not a
/// JSON array of the expected shape.
pub fn parse_reranked_entries(text: &str) -> Option<Vec<RerankedEntry>> {
    let value = extract_json_from_text(text)?;
    let array = value.as_array()?;
    let entries: Vec<RerankedEntry> = array
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect();
    if entries.is_empty() {
        return None;
    }
    Some(entries)
}

/// Tolerant JSON extraction from generative-model text: strict parse
/// first, then the widest bracketed slice.
pub fn extract_json_from_text(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    for (open, close) in [('[', ']'), ('{', '}')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if end > start {
                if let Ok(value) = serde_json::from_str(&text[start..=end]) {
                    return Some(value);
                }
            }
        }
    }
    None
}
