//! Batch scheduler for the tagging backend
//!
//! A single dispatcher task owns the backend stream. Submitted texts queue
//! up on a channel; the dispatcher groups them into backend batches of at
//! most `max_batch_size`, dispatching when the cap is reached or when the
//! window opened by the first queued text elapses. Results go back to each
//! caller in submission order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use lexicon_core::{LexiconError, PerformanceConfig, Result, Span, TaggingBackend};

/// Batch scheduler settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub max_batch_size: usize,
    /// How long the first queued text waits for company
    pub window: Duration,
    /// Maximum number of texts queued and not yet dispatched
    pub queue_limit: usize,
}

impl BatchConfig {
    pub fn from_performance(config: &PerformanceConfig) -> Self {
        Self {
            max_batch_size: config.max_batch_size,
            window: Duration::from_millis(config.batch_window_ms),
            queue_limit: config.queue_limit,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::from_performance(&PerformanceConfig::default())
    }
}

struct Job {
    text: String,
    reply: oneshot::Sender<Result<Vec<Span>>>,
}

#[derive(Debug, Default)]
struct BatchCounters {
    batches: AtomicU64,
    items: AtomicU64,
    rejected: AtomicU64,
}

/// Serializable batch statistics report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatsReport {
    /// Backend invocations
    pub batches: u64,
    /// Texts tagged
    pub items: u64,
    /// Texts rejected because the queue was full
    pub rejected: u64,
    /// Texts queued and not yet dispatched
    pub queued: usize,
    /// Average texts per backend invocation
    pub average_batch_size: f64,
}

/// Front end of the dispatcher task
///
/// Cheap to clone; every clone feeds the same dispatcher.
#[derive(Clone)]
pub struct BatchScheduler {
    sender: mpsc::UnboundedSender<Job>,
    queue: Arc<Semaphore>,
    queue_limit: usize,
    counters: Arc<BatchCounters>,
}

impl BatchScheduler {
    /// Start the dispatcher task. Must be called within a Tokio runtime.
    pub fn spawn(backend: Arc<dyn TaggingBackend>, config: BatchConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue_limit = config.queue_limit.max(1);
        let queue = Arc::new(Semaphore::new(queue_limit));
        let counters = Arc::new(BatchCounters::default());

        tokio::spawn(dispatch_loop(
            backend,
            receiver,
            Arc::clone(&queue),
            Arc::clone(&counters),
            config.max_batch_size.max(1),
            config.window,
        ));

        Self {
            sender,
            queue,
            queue_limit,
            counters,
        }
    }

    /// Tag a single text
    pub async fn tag(&self, text: String) -> Result<Vec<Span>> {
        self.submit(vec![text])
            .await?
            .pop()
            .ok_or_else(|| LexiconError::BackendUnavailable("empty batch result".to_string()))
    }

    /// Tag several texts, results aligned with `texts`
    ///
    /// The submission is rejected as a whole when the queue cannot take all
    /// of it.
    pub async fn submit(&self, texts: Vec<String>) -> Result<Vec<Vec<Span>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let count = texts.len();
        let permits = u32::try_from(count)
            .ok()
            .and_then(|n| Arc::clone(&self.queue).try_acquire_many_owned(n).ok());
        let Some(permits) = permits else {
            self.counters.rejected.fetch_add(count as u64, Ordering::Relaxed);
            return Err(LexiconError::Overloaded(format!(
                "tagging queue cannot take {count} more texts"
            )));
        };
        // The dispatcher hands the permits back once the texts leave the queue
        permits.forget();

        let mut replies = Vec::with_capacity(count);
        for text in texts {
            let (reply, response) = oneshot::channel();
            self.sender
                .send(Job { text, reply })
                .map_err(|_| dispatcher_stopped())?;
            replies.push(response);
        }

        let mut results = Vec::with_capacity(count);
        for response in replies {
            results.push(response.await.map_err(|_| dispatcher_stopped())??);
        }
        Ok(results)
    }

    /// Texts queued and not yet dispatched
    pub fn queued(&self) -> usize {
        self.queue_limit.saturating_sub(self.queue.available_permits())
    }

    /// Generate a statistics report
    pub fn report(&self) -> BatchStatsReport {
        let batches = self.counters.batches.load(Ordering::Relaxed);
        let items = self.counters.items.load(Ordering::Relaxed);
        BatchStatsReport {
            batches,
            items,
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            queued: self.queued(),
            average_batch_size: if batches == 0 {
                0.0
            } else {
                items as f64 / batches as f64
            },
        }
    }
}

fn dispatcher_stopped() -> LexiconError {
    LexiconError::BackendUnavailable("batch dispatcher stopped".to_string())
}

async fn dispatch_loop(
    backend: Arc<dyn TaggingBackend>,
    mut receiver: mpsc::UnboundedReceiver<Job>,
    queue: Arc<Semaphore>,
    counters: Arc<BatchCounters>,
    max_batch_size: usize,
    window: Duration,
) {
    while let Some(first) = receiver.recv().await {
        let deadline = Instant::now() + window;
        let mut batch = vec![first];

        while batch.len() < max_batch_size {
            match timeout_at(deadline, receiver.recv()).await {
                Ok(Some(job)) => batch.push(job),
                // channel closed or window elapsed
                Ok(None) | Err(_) => break,
            }
        }

        queue.add_permits(batch.len());
        counters.batches.fetch_add(1, Ordering::Relaxed);
        counters.items.fetch_add(batch.len() as u64, Ordering::Relaxed);
        dispatch(&backend, batch).await;
    }
    debug!("Batch dispatcher stopped");
}

async fn dispatch(backend: &Arc<dyn TaggingBackend>, batch: Vec<Job>) {
    let (texts, replies): (Vec<String>, Vec<_>) =
        batch.into_iter().map(|job| (job.text, job.reply)).unzip();
    debug!(batch_size = texts.len(), "Dispatching tagging batch");

    // A panicking backend fails its batch, not the dispatcher
    let backend = Arc::clone(backend);
    let call = tokio::spawn(async move { backend.tag_batch(&texts).await });

    let outcome = match call.await {
        Ok(Ok(results)) if results.len() == replies.len() => Ok(results),
        Ok(Ok(results)) => Err(LexiconError::BackendUnavailable(format!(
            "backend returned {} results for {} texts",
            results.len(),
            replies.len()
        ))),
        Ok(Err(e)) => Err(e),
        Err(e) => Err(LexiconError::BackendUnavailable(format!(
            "tagging backend aborted: {e}"
        ))),
    };

    match outcome {
        Ok(results) => {
            for (reply, spans) in replies.into_iter().zip(results) {
                // the caller may have given up; nothing to do then
                let _ = reply.send(Ok(spans));
            }
        }
        Err(e) => {
            warn!(batch_size = replies.len(), error = %e, "Tagging batch failed");
            for reply in replies {
                let _ = reply.send(Err(e.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lexicon_core::{EntityType, SpanLabel};
    use std::sync::Mutex;

    /// Records batch sizes; tags each text as one PER span scored by length
    #[derive(Default)]
    struct RecordingBackend {
        batches: Mutex<Vec<usize>>,
        fail: bool,
    }

    impl RecordingBackend {
        fn batches(&self) -> Vec<usize> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TaggingBackend for RecordingBackend {
        async fn tag(&self, text: &str) -> Result<Vec<Span>> {
            Ok(vec![Span::new(
                0,
                text.len(),
                text,
                SpanLabel::Begin(EntityType::Person),
                0.9,
            )])
        }

        async fn tag_batch(&self, texts: &[String]) -> Result<Vec<Vec<Span>>> {
            self.batches.lock().unwrap().push(texts.len());
            if self.fail {
                return Err(LexiconError::BackendUnavailable("model crashed".to_string()));
            }
            let mut results = Vec::new();
            for text in texts {
                results.push(self.tag(text).await?);
            }
            Ok(results)
        }

        fn model_id(&self) -> &str {
            "recording"
        }
    }

    fn config(max_batch_size: usize, queue_limit: usize) -> BatchConfig {
        BatchConfig {
            max_batch_size,
            window: Duration::from_millis(10),
            queue_limit,
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text number {i}")).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_keep_submission_order() {
        let backend = Arc::new(RecordingBackend::default());
        let scheduler = BatchScheduler::spawn(backend.clone(), config(32, 64));

        let input = texts(5);
        let results = scheduler.submit(input.clone()).await.unwrap();

        let tagged: Vec<&str> = results.iter().map(|spans| spans[0].text.as_str()).collect();
        assert_eq!(tagged, input.iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(backend.batches(), vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_cap_splits_batches() {
        let backend = Arc::new(RecordingBackend::default());
        let scheduler = BatchScheduler::spawn(backend.clone(), config(2, 64));

        let input = texts(5);
        let results = scheduler.submit(input.clone()).await.unwrap();

        assert_eq!(results.len(), 5);
        assert_eq!(results[4][0].text, input[4]);
        assert_eq!(backend.batches(), vec![2, 2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_singles_share_one_call() {
        let backend = Arc::new(RecordingBackend::default());
        let scheduler = BatchScheduler::spawn(backend.clone(), config(32, 64));

        let calls = texts(3).into_iter().map(|text| scheduler.tag(text));
        let results = futures::future::join_all(calls).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(backend.batches(), vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lone_request_dispatches_at_window_deadline() {
        let backend = Arc::new(RecordingBackend::default());
        let scheduler = BatchScheduler::spawn(backend.clone(), config(32, 64));

        let started = Instant::now();
        scheduler.tag("Joko Widodo".to_string()).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(10));
        assert_eq!(backend.batches(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_batch_does_not_wait_for_window() {
        let backend = Arc::new(RecordingBackend::default());
        let scheduler = BatchScheduler::spawn(backend.clone(), config(4, 64));

        let started = Instant::now();
        scheduler.submit(texts(4)).await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_limit_rejects_whole_submission() {
        let backend = Arc::new(RecordingBackend::default());
        let scheduler = BatchScheduler::spawn(backend.clone(), config(32, 2));

        let result = scheduler.submit(texts(3)).await;
        assert!(matches!(result, Err(LexiconError::Overloaded(_))));
        assert!(backend.batches().is_empty());
        assert_eq!(scheduler.report().rejected, 3);

        // nothing was queued, so a submission that fits still goes through
        assert_eq!(scheduler.submit(texts(2)).await.unwrap().len(), 2);
        assert_eq!(scheduler.queued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_failure_reaches_every_caller() {
        let backend = Arc::new(RecordingBackend {
            fail: true,
            ..Default::default()
        });
        let scheduler = BatchScheduler::spawn(backend, config(32, 64));

        let calls = texts(3).into_iter().map(|text| scheduler.tag(text));
        let results = futures::future::join_all(calls).await;
        for result in results {
            assert!(matches!(result, Err(LexiconError::BackendUnavailable(_))));
        }
    }

    /// Panics on any batch containing "boom"
    struct PanickingBackend;

    #[async_trait]
    impl TaggingBackend for PanickingBackend {
        async fn tag(&self, text: &str) -> Result<Vec<Span>> {
            RecordingBackend::default().tag(text).await
        }

        async fn tag_batch(&self, texts: &[String]) -> Result<Vec<Vec<Span>>> {
            if texts.iter().any(|t| t == "boom") {
                panic!("tagger crashed");
            }
            let mut results = Vec::new();
            for text in texts {
                results.push(self.tag(text).await?);
            }
            Ok(results)
        }

        fn model_id(&self) -> &str {
            "panicking"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_panic_keeps_dispatcher_alive() {
        let scheduler = BatchScheduler::spawn(Arc::new(PanickingBackend), config(32, 64));

        let result = scheduler.tag("boom".to_string()).await;
        assert!(matches!(result, Err(LexiconError::BackendUnavailable(_))));

        let spans = scheduler.tag("Joko Widodo".to_string()).await.unwrap();
        assert_eq!(spans[0].text, "Joko Widodo");
        assert_eq!(scheduler.queued(), 0);
        assert_eq!(scheduler.report().batches, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report() {
        let backend = Arc::new(RecordingBackend::default());
        let scheduler = BatchScheduler::spawn(backend, config(2, 64));
        scheduler.submit(texts(4)).await.unwrap();

        let report = scheduler.report();
        assert_eq!(report.batches, 2);
        assert_eq!(report.items, 4);
        assert!((report.average_batch_size - 2.0).abs() < f64::EPSILON);
    }
}
