//! Fault-tolerant batch processor (spec §4.8): generic over an item type and an async
//! `process(item) -> Result` closure. Retries with backoff, per-item timeout, a sliding-window
//! circuit breaker, and bounded concurrency.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_concurrent: usize,
    pub timeout: Duration,
    pub circuit_breaker_threshold: f64,
    pub circuit_breaker_window: usize,
    pub continue_on_failure: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_concurrent: 10,
            timeout: Duration::from_secs(90),
            circuit_breaker_threshold: 0.5,
            circuit_breaker_window: 20,
            continue_on_failure: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ItemOutcome<R> {
    Success(R),
    Retried(R, u32),
    Failed(String),
    Skipped,
}

pub struct BatchResult<R> {
    pub outcomes: Vec<ItemOutcome<R>>,
    pub success_count: u32,
    pub retried_count: u32,
    pub failed_count: u32,
    pub skipped_count: u32,
    pub error_groups: HashMap<String, u32>,
    pub tripped: bool,
}

struct SlidingWindow {
    window: VecDeque<bool>,
    capacity: usize,
}

impl SlidingWindow {
    fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records an outcome and returns whether the window is full and its failure rate now
    /// exceeds `threshold` (spec §4.8: "trips" the breaker once the window fills).
    fn record(&mut self, success: bool, threshold: f64) -> bool {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(success);
        if self.window.len() < self.capacity {
            return false;
        }
        let failures = self.window.iter().filter(|s| !**s).count();
        (failures as f64 / self.capacity as f64) > threshold
    }
}

async fn process_one<T, R, E, F, Fut>(
    item: T,
    config: &ProcessorConfig,
    process: &F,
    window: &Mutex<SlidingWindow>,
    tripped: &AtomicBool,
) -> (ItemOutcome<R>, Option<String>)
where
    T: Clone,
    E: std::fmt::Display,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    if tripped.load(Ordering::SeqCst) && !config.continue_on_failure {
        return (ItemOutcome::Skipped, None);
    }

    let mut attempt = 0u32;
    let mut last_error: Option<String> = None;

    loop {
        let outcome = timeout(config.timeout, process(item.clone())).await;
        let result = match outcome {
            Ok(inner) => inner.map_err(|e| e.to_string()),
            Err(_) => Err("timed out".to_string()),
        };

        match result {
            Ok(value) => {
                let tripped_now = window.lock().record(true, config.circuit_breaker_threshold);
                if tripped_now {
                    tripped.store(true, Ordering::SeqCst);
                }
                let outcome = if attempt == 0 {
                    ItemOutcome::Success(value)
                } else {
                    ItemOutcome::Retried(value, attempt)
                };
                return (outcome, None);
            }
            Err(error_text) => {
                last_error = Some(error_text.clone());
                if attempt >= config.max_retries {
                    let tripped_now = window.lock().record(false, config.circuit_breaker_threshold);
                    if tripped_now {
                        tripped.store(true, Ordering::SeqCst);
                        warn!("batch processor circuit breaker tripped");
                    }
                    return (ItemOutcome::Failed(error_text), last_error);
                }
                let delay = Duration::from_secs_f64(
                    config.retry_delay.as_secs_f64() * config.backoff_multiplier.powi(attempt as i32),
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Runs `process` over every item in `items`, honoring retry/backoff, per-item timeout,
/// the sliding-window circuit breaker, and `max_concurrent` (spec §4.8).
pub async fn run_batch<T, R, E, F, Fut>(items: Vec<T>, config: ProcessorConfig, process: F) -> BatchResult<R>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: std::fmt::Display + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send,
{
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
    let window = Arc::new(Mutex::new(SlidingWindow::new(config.circuit_breaker_window.max(1))));
    let tripped = Arc::new(AtomicBool::new(false));
    let process = Arc::new(process);
    let config = Arc::new(config);

    let mut handles = Vec::with_capacity(items.len());
    for item in items {
        let semaphore = semaphore.clone();
        let window = window.clone();
        let tripped = tripped.clone();
        let process = process.clone();
        let config = config.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            process_one(item, &config, process.as_ref(), window.as_ref(), tripped.as_ref()).await
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    let mut error_groups: HashMap<String, u32> = HashMap::new();
    let (mut success_count, mut retried_count, mut failed_count, mut skipped_count) = (0, 0, 0, 0);

    for handle in handles {
        let (outcome, error) = handle.await.unwrap_or((ItemOutcome::Failed("task panicked".to_string()), None));
        match &outcome {
            ItemOutcome::Success(_) => success_count += 1,
            ItemOutcome::Retried(_, _) => retried_count += 1,
            ItemOutcome::Failed(_) => failed_count += 1,
            ItemOutcome::Skipped => skipped_count += 1,
        }
        if let Some(err) = error {
            *error_groups.entry(classify_error(&err)).or_insert(0) += 1;
        }
        outcomes.push(outcome);
    }

    BatchResult {
        outcomes,
        success_count,
        retried_count,
        failed_count,
        skipped_count,
        error_groups,
        tripped: tripped.load(Ordering::SeqCst),
    }
}

/// Coarse error-type grouping for `BatchResult::error_groups` (spec §4.8 "groupings by
/// error-type"). Keeps the batch summary readable without needing a typed error taxonomy
/// for every possible item processor.
fn classify_error(message: &str) -> String {
    let lower = message.to_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        "timeout".to_string()
    } else if lower.contains("rate limit") || lower.contains("429") {
        "rate_limited".to_string()
    } else if lower.contains("connection") || lower.contains("network") {
        "network".to_string()
    } else {
        "other".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn succeeds_on_first_try_without_retry() {
        let result = run_batch(
            vec![1, 2, 3],
            ProcessorConfig::default(),
            |item: i32| async move { Ok::<_, String>(item * 2) },
        )
        .await;
        assert_eq!(result.success_count, 3);
        assert_eq!(result.failed_count, 0);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let result = run_batch(
            vec![1],
            ProcessorConfig {
                max_retries: 3,
                retry_delay: Duration::from_millis(1),
                ..Default::default()
            },
            move |_item: i32| {
                let attempts = attempts_clone.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;
        assert_eq!(result.retried_count, 1);
        assert!(matches!(result.outcomes[0], ItemOutcome::Retried(42, 2)));
    }

    #[tokio::test]
    async fn trips_breaker_after_window_fills_with_failures() {
        let config = ProcessorConfig {
            max_retries: 0,
            retry_delay: Duration::from_millis(1),
            circuit_breaker_window: 4,
            circuit_breaker_threshold: 0.5,
            max_concurrent: 1,
            ..Default::default()
        };
        let items: Vec<i32> = (0..8).collect();
        let result = run_batch(items, config, |_item: i32| async move {
            Err::<i32, String>("boom".to_string())
        })
        .await;
        assert!(result.tripped);
        assert!(result.skipped_count > 0);
    }
}
