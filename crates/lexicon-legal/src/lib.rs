//! Lexicon Legal - Legal role extraction
//!
//! Asks a remote generative model which people in a legal text are
//! defendants, plaintiffs or representatives, and keeps only the answers
//! that can be grounded in the text:
//! - [`prompt`] builds the structured prompt and response schema
//! - [`llm`] holds the OpenAI and Ollama adapters
//! - [`response`] parses, validates and maps role assignments
//! - [`retry`] is the backoff loop around transient failures

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info};

use lexicon_core::{CompletionFailure, Entity, LlmClient, LlmConfig, Result};

pub mod llm;
pub mod prompt;
pub mod response;
pub mod retry;

pub use llm::{create_llm_client, OllamaClient, OpenAiClient};
pub use response::{map_role, Assignment};
pub use retry::{Attempt, BackoffSchedule, RetryPolicy};

/// Extracts person entities with legal roles
pub struct LegalRoleExtractor {
    client: Arc<dyn LlmClient>,
    policy: RetryPolicy,
    /// Bounds concurrent remote calls, independent of the tagging queue
    permits: Semaphore,
}

impl LegalRoleExtractor {
    pub fn new(client: Arc<dyn LlmClient>, policy: RetryPolicy, max_concurrent: usize) -> Self {
        Self {
            client,
            policy,
            permits: Semaphore::new(max_concurrent.max(1)),
        }
    }

    pub fn from_config(client: Arc<dyn LlmClient>, config: &LlmConfig) -> Self {
        Self::new(
            client,
            RetryPolicy::from_config(config),
            config.max_concurrent_requests,
        )
    }

    /// Model name reported by the adapter
    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Identify the people in `text` and their roles
    ///
    /// `candidates` are person names found by NER, passed to the model as a
    /// hint. Entities carry byte offsets into `text`. A model answer that
    /// cannot be parsed is retried like any other transient failure.
    pub async fn extract(&self, text: &str, candidates: &[String]) -> Result<Vec<Entity>> {
        let request = prompt::completion_request(text, candidates);
        let request = &request;

        let assignments = self
            .policy
            .run("legal_roles", move |attempt| async move {
                let _permit = match self.permits.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return Attempt::Fatal("remote model pool closed".to_string()),
                };
                debug!(attempt, model = self.client.model(), "Calling remote model");

                match self.client.complete(request).await {
                    Ok(content) => match response::parse_response(&content) {
                        Ok(assignments) => Attempt::Success(assignments),
                        Err(reason) => Attempt::retryable(reason),
                    },
                    Err(failure) => classify(failure),
                }
            })
            .await?;

        let proposed = assignments.len();
        let entities = response::validate(text, assignments);
        info!(
            proposed,
            kept = entities.len(),
            "Legal role extraction complete"
        );
        Ok(entities)
    }
}

fn classify<T>(failure: CompletionFailure) -> Attempt<T> {
    match &failure {
        CompletionFailure::RateLimited { retry_after } => Attempt::Retryable {
            retry_after: *retry_after,
            reason: failure.to_string(),
        },
        _ if failure.is_transient() => Attempt::retryable(failure.to_string()),
        _ => Attempt::Fatal(failure.to_string()),
    }
}
