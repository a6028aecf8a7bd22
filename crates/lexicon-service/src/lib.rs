//! Lexicon Service - Request coordination
//!
//! Wires the tagging backend, the entity pipeline and the legal role
//! extractor behind one facade:
//! - [`fingerprint`] identifies units of work
//! - [`cache::CacheCoordinator`] shares one computation per fingerprint
//! - [`batch::BatchScheduler`] groups tagging calls into backend batches
//!
//! Both the HTTP API and the CLI drive a [`LexiconService`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use lexicon_core::{
    AppConfig, Entity, EntityType, LexiconError, LlmClient, ModelConfig, Result, TaggerKind,
    TaggingBackend,
};
use lexicon_extractor::{EntityPipeline, GazetteerTagger, HttpTaggingBackend, TitleRuleTable};
use lexicon_legal::{create_llm_client, LegalRoleExtractor};

pub mod batch;
pub mod cache;
pub mod fingerprint;

pub use batch::{BatchConfig, BatchScheduler, BatchStatsReport};
pub use cache::{CacheCoordinator, CacheStats, CacheStatsReport};
pub use fingerprint::{Fingerprint, OperationKind};

/// Limits applied by the facade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceLimits {
    /// How long a caller waits for one result
    pub request_timeout: Duration,
    pub max_ner_batch: usize,
    pub max_legal_batch: usize,
}

impl ServiceLimits {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
            max_ner_batch: config.performance.max_ner_batch,
            max_legal_batch: config.performance.max_legal_batch,
        }
    }
}

#[derive(Debug, Default)]
struct RequestCounters {
    ner: AtomicU64,
    legal: AtomicU64,
    failed: AtomicU64,
}

/// Serializable service statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Texts submitted for entity recognition
    pub ner_requests: u64,
    /// Texts submitted for legal role extraction
    pub legal_requests: u64,
    /// Requests that ended in an error
    pub failed_requests: u64,
    pub cache: CacheStatsReport,
    pub batching: BatchStatsReport,
    pub uptime_seconds: u64,
}

/// Entity recognition and legal role extraction service
///
/// Cheap to clone; clones share caches, the batch dispatcher and counters.
#[derive(Clone)]
pub struct LexiconService {
    pipeline: Arc<EntityPipeline>,
    backend: Arc<dyn TaggingBackend>,
    scheduler: BatchScheduler,
    cache: CacheCoordinator<Vec<Entity>>,
    legal: Option<Arc<LegalRoleExtractor>>,
    limits: ServiceLimits,
    counters: Arc<RequestCounters>,
    started: Instant,
}

impl LexiconService {
    /// Build the service from a resolved configuration
    ///
    /// Spawns the batch dispatcher, so it must run within a Tokio runtime.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let backend = create_tagging_backend(
            &config.model,
            Duration::from_secs(config.server.request_timeout_secs),
        )?;
        let llm = create_llm_client(&config.llm)?;
        if llm.is_none() {
            info!("No remote model configured, legal extraction disabled");
        }
        Self::with_backends(config, backend, llm)
    }

    /// Build the service around explicit backends
    pub fn with_backends(
        config: &AppConfig,
        backend: Arc<dyn TaggingBackend>,
        llm: Option<Arc<dyn LlmClient>>,
    ) -> Result<Self> {
        let table = TitleRuleTable::load(config.normalizer.rules_path.as_deref())
            .map_err(|e| LexiconError::Config(e.to_string()))?;
        info!(
            rules = table.len(),
            digest = &table.digest()[..12],
            "Title rules loaded"
        );

        let pipeline = EntityPipeline::new(
            Arc::new(table),
            config.normalizer.context_window,
            config.normalizer.title_penalty,
            config.model.min_text_length,
        );
        let scheduler = BatchScheduler::spawn(
            Arc::clone(&backend),
            BatchConfig::from_performance(&config.performance),
        );
        let legal = llm.map(|client| Arc::new(LegalRoleExtractor::from_config(client, &config.llm)));

        Ok(Self {
            pipeline: Arc::new(pipeline),
            backend,
            scheduler,
            cache: CacheCoordinator::new(
                config.performance.cache_size,
                config.performance.max_in_flight,
            ),
            legal,
            limits: ServiceLimits::from_config(config),
            counters: Arc::new(RequestCounters::default()),
            started: Instant::now(),
        })
    }

    // ========================================================================
    // Entity recognition
    // ========================================================================

    /// Recognize entities in one text
    pub async fn recognize(&self, text: &str) -> Result<Vec<Entity>> {
        self.counters.ner.fetch_add(1, Ordering::Relaxed);
        let result = self.recognize_inner(text).await;
        self.track(result)
    }

    /// Recognize entities in several texts, results in input order
    pub async fn recognize_batch(&self, texts: &[String]) -> Result<Vec<Vec<Entity>>> {
        let result: Result<Vec<Vec<Entity>>> = async {
            check_batch(texts, self.limits.max_ner_batch)?;
            self.counters
                .ner
                .fetch_add(texts.len() as u64, Ordering::Relaxed);
            join_all(texts.iter().map(|text| self.recognize_inner(text)))
                .await
                .into_iter()
                .collect()
        }
        .await;
        self.track(result)
    }

    async fn recognize_inner(&self, text: &str) -> Result<Vec<Entity>> {
        check_text(text)?;
        if self.pipeline.is_too_short(text) {
            debug!(length = text.chars().count(), "Text too short, skipping tagging");
            return Ok(Vec::new());
        }

        let fingerprint = Fingerprint::compute(
            OperationKind::Ner,
            text,
            self.backend.model_id(),
            self.pipeline.rules_digest(),
            self.pipeline.context_window(),
        );
        let scheduler = self.scheduler.clone();
        let pipeline = Arc::clone(&self.pipeline);
        let owned = text.to_string();

        self.with_timeout(self.cache.get_or_compute(fingerprint, move || async move {
            let spans = scheduler.tag(owned.clone()).await?;
            Ok(pipeline.process(&owned, &spans))
        }))
        .await
    }

    // ========================================================================
    // Legal role extraction
    // ========================================================================

    /// Identify defendants, plaintiffs and representatives in one text
    pub async fn extract_legal(&self, text: &str) -> Result<Vec<Entity>> {
        self.counters.legal.fetch_add(1, Ordering::Relaxed);
        let result = self.extract_legal_inner(text).await;
        self.track(result)
    }

    /// Legal role extraction for several texts, results in input order
    pub async fn extract_legal_batch(&self, texts: &[String]) -> Result<Vec<Vec<Entity>>> {
        let result: Result<Vec<Vec<Entity>>> = async {
            self.legal_extractor()?;
            check_batch(texts, self.limits.max_legal_batch)?;
            self.counters
                .legal
                .fetch_add(texts.len() as u64, Ordering::Relaxed);
            join_all(texts.iter().map(|text| self.extract_legal_inner(text)))
                .await
                .into_iter()
                .collect()
        }
        .await;
        self.track(result)
    }

    async fn extract_legal_inner(&self, text: &str) -> Result<Vec<Entity>> {
        let legal = Arc::clone(self.legal_extractor()?);
        check_text(text)?;
        if self.pipeline.is_too_short(text) {
            return Ok(Vec::new());
        }

        let fingerprint = self.legal_fingerprint(&legal, text);
        let service = self.clone();
        let owned = text.to_string();

        self.with_timeout(self.cache.get_or_compute(fingerprint, move || async move {
            let candidates = service.person_candidates(&owned).await;
            legal.extract(&owned, &candidates).await
        }))
        .await
    }

    /// Tagger output is part of the prompt, so both models key the result
    fn legal_fingerprint(&self, legal: &LegalRoleExtractor, text: &str) -> Fingerprint {
        let models = format!("{}+{}", legal.model(), self.backend.model_id());
        Fingerprint::compute(
            OperationKind::LegalRoles,
            text,
            &models,
            self.pipeline.rules_digest(),
            self.pipeline.context_window(),
        )
    }

    /// Distinct person names found by NER, used as a hint for the model
    ///
    /// The names are only a hint, so a failing tagger degrades to none.
    async fn person_candidates(&self, text: &str) -> Vec<String> {
        match self.recognize_inner(text).await {
            Ok(entities) => {
                let mut names: Vec<String> = Vec::new();
                for entity in entities {
                    if entity.entity_type == EntityType::Person && !names.contains(&entity.text) {
                        names.push(entity.text);
                    }
                }
                names
            }
            Err(e) => {
                warn!(error = %e, "Person candidates unavailable, prompting without them");
                Vec::new()
            }
        }
    }

    fn legal_extractor(&self) -> Result<&Arc<LegalRoleExtractor>> {
        self.legal.as_ref().ok_or_else(|| {
            LexiconError::RemoteModelUnconfigured(
                "legal entity extraction requires a remote model API key".to_string(),
            )
        })
    }

    // ========================================================================
    // Health and statistics
    // ========================================================================

    /// Whether the tagging model is loaded and able to serve
    pub fn model_loaded(&self) -> bool {
        self.backend.is_ready()
    }

    /// Whether legal extraction is available
    pub fn legal_configured(&self) -> bool {
        self.legal.is_some()
    }

    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn limits(&self) -> &ServiceLimits {
        &self.limits
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            ner_requests: self.counters.ner.load(Ordering::Relaxed),
            legal_requests: self.counters.legal.load(Ordering::Relaxed),
            failed_requests: self.counters.failed.load(Ordering::Relaxed),
            cache: self.cache.report(),
            batching: self.scheduler.report(),
            uptime_seconds: self.uptime().as_secs(),
        }
    }

    async fn with_timeout<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        let limit = self.limits.request_timeout;
        tokio::time::timeout(limit, fut).await.map_err(|_| {
            LexiconError::Timeout(format!("no result within {} ms", limit.as_millis()))
        })?
    }

    fn track<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

/// Create the tagging backend named by the model configuration
pub fn create_tagging_backend(
    config: &ModelConfig,
    timeout: Duration,
) -> Result<Arc<dyn TaggingBackend>> {
    match config.backend {
        TaggerKind::Gazetteer => Ok(Arc::new(
            GazetteerTagger::new().with_model_id(config.model_id.clone()),
        )),
        TaggerKind::Http => {
            let url = config.backend_url.as_deref().ok_or_else(|| {
                LexiconError::Config("NER_BACKEND_URL is required for the http backend".to_string())
            })?;
            Ok(Arc::new(HttpTaggingBackend::new(
                url,
                config.model_id.clone(),
                timeout,
            )?))
        }
    }
}

fn check_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(LexiconError::Validation("text must not be empty".to_string()));
    }
    Ok(())
}

fn check_batch(texts: &[String], limit: usize) -> Result<()> {
    if texts.is_empty() {
        return Err(LexiconError::Validation("texts must not be empty".to_string()));
    }
    if texts.len() > limit {
        return Err(LexiconError::Validation(format!(
            "batch of {} texts exceeds the limit of {limit}",
            texts.len()
        )));
    }
    Ok(())
}
