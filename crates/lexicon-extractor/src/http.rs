//! Tagging backend served by a remote model server
//!
//! Protocol: `POST {base_url}/tag` with `{"texts": [...]}` answered by
//! `{"results": [[span, ...], ...]}`, one span list per input text. Spans use
//! the same JSON shape as [`lexicon_core::Span`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use lexicon_core::{LexiconError, Result, Span, TaggingBackend};

#[derive(Debug, Serialize)]
struct TagRequest<'a> {
    texts: &'a [String],
}

#[derive(Debug, Deserialize)]
struct TagResponse {
    results: Vec<Vec<Span>>,
}

/// JSON-over-HTTP client for a sequence tagging model server
pub struct HttpTaggingBackend {
    client: reqwest::Client,
    endpoint: String,
    model_id: String,
    /// Cleared after a failed call, set again after a successful one
    ready: AtomicBool,
}

impl HttpTaggingBackend {
    pub fn new(base_url: &str, model_id: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LexiconError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/tag", base_url.trim_end_matches('/')),
            model_id: model_id.into(),
            ready: AtomicBool::new(true),
        })
    }

    fn unavailable(&self, message: String) -> LexiconError {
        self.ready.store(false, Ordering::Relaxed);
        warn!(endpoint = %self.endpoint, error = %message, "Tagging backend call failed");
        LexiconError::BackendUnavailable(message)
    }
}

#[async_trait]
impl TaggingBackend for HttpTaggingBackend {
    async fn tag(&self, text: &str) -> Result<Vec<Span>> {
        let mut results = self.tag_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| LexiconError::BackendUnavailable("empty response".to_string()))
    }

    async fn tag_batch(&self, texts: &[String]) -> Result<Vec<Vec<Span>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(endpoint = %self.endpoint, batch_size = texts.len(), "Calling tagging backend");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&TagRequest { texts })
            .send()
            .await
            .map_err(|e| self.unavailable(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(self.unavailable(format!("model server returned {status}: {body}")));
        }

        let parsed: TagResponse = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("invalid response: {e}")))?;

        if parsed.results.len() != texts.len() {
            return Err(self.unavailable(format!(
                "expected {} results, got {}",
                texts.len(),
                parsed.results.len()
            )));
        }

        self.ready.store(true, Ordering::Relaxed);
        Ok(parsed.results)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}
