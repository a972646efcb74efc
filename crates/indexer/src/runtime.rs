use crate::error::{IndexerError, Result};
use crate::memory::{MemoryMonitor, MemorySample};
use crate::recovery::RecoveryRegistry;
use semsync_protocol::{BatchConfig, RetryConfig};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Retries an operation under the configured policy, consulting the
/// recovery registry for whether the failure kind is worth retrying at all.
///
/// The effective attempt budget is the tighter of the global
/// `retry.max_attempts` and the per-kind `max_retries + 1`.
pub struct RetryRunner {
    config: RetryConfig,
    registry: Arc<RecoveryRegistry>,
}

impl RetryRunner {
    #[must_use]
    pub fn new(config: RetryConfig, registry: Arc<RecoveryRegistry>) -> Self {
        Self { config, registry }
    }

    pub async fn execute_with_retry<T, F, Fut>(&self, name: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut failures = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    failures += 1;
                    let kind = err.kind();
                    let within_budget = failures < self.config.max_attempts
                        && self.registry.should_retry(kind, failures);
                    if !within_budget {
                        if failures > 1 {
                            log::error!(
                                "{name} gave up after {failures} attempts ({}): {err}",
                                kind.as_str()
                            );
                        }
                        return Err(err);
                    }
                    let delay = self.delay_for(&err, failures);
                    log::warn!(
                        "{name} attempt {failures} failed ({}): {err}; retrying in {delay:?}",
                        kind.as_str()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Backoff delay for the next attempt:
    /// `min(max_delay, base · factor^(failures-1)) · (1 ± jitter)`.
    fn delay_for(&self, err: &IndexerError, failures: u32) -> Duration {
        let plan = self.registry.plan_for(err.kind());
        let base = if plan.base_delay.is_zero() {
            self.config.base_delay
        } else {
            plan.base_delay
        };

        let exponent = failures.saturating_sub(1).min(16);
        let scaled = base.as_secs_f64() * self.config.backoff_factor.powi(exponent as i32);
        let capped = scaled.min(self.config.max_delay.as_secs_f64());
        let jittered = capped * jitter_factor(self.config.jitter);
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Multiplier in `[1 - jitter, 1 + jitter]`, seeded from the std hasher's
/// process-global randomness (no rng dependency needed for spreading
/// retries).
fn jitter_factor(jitter: f64) -> f64 {
    if jitter <= 0.0 {
        return 1.0;
    }
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(Instant::now().elapsed().subsec_nanos().into());
    let unit = (hasher.finish() >> 11) as f64 / (1u64 << 53) as f64;
    1.0 - jitter + 2.0 * jitter * unit
}

/// Per-batch report handed to the caller's progress callback.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub index: usize,
    pub size: usize,
    pub processed: usize,
    pub remaining: usize,
    pub duration: Duration,
    pub next_size: usize,
    pub memory_forced_min: bool,
    pub memory_sample: Option<MemorySample>,
}

/// Adaptive, memory-aware batch executor: batches run serially, items
/// within a batch run concurrently up to the configured cap.
pub struct BatchRunner {
    config: BatchConfig,
    monitor: MemoryMonitor,
    cleanup_hook: Option<Arc<dyn Fn() + Send + Sync>>,
    stop: Option<Arc<AtomicBool>>,
}

impl BatchRunner {
    #[must_use]
    pub fn new(config: BatchConfig, monitor: MemoryMonitor) -> Self {
        Self {
            config,
            monitor,
            cleanup_hook: None,
            stop: None,
        }
    }

    /// Register a cooperative cleanup hook invoked when memory crosses the
    /// critical threshold (cache flushes and similar).
    #[must_use]
    pub fn with_cleanup_hook(mut self, hook: Arc<dyn Fn() + Send + Sync>) -> Self {
        self.cleanup_hook = Some(hook);
        self
    }

    /// Cooperative cancellation: when the flag is set, the in-flight batch
    /// finishes but no further batch is dispatched.
    #[must_use]
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Process `items` in adaptive batches. Results preserve input order;
    /// a failing item yields its error in place and never aborts the batch.
    pub async fn process_batches<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        name: &str,
        processor: F,
        mut on_batch: impl FnMut(&BatchReport),
    ) -> Vec<Result<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let total = items.len();
        let mut remaining: VecDeque<T> = items.into();
        let mut results = Vec::with_capacity(total);
        let mut current_size = self.config.initial_size.clamp(
            self.config.min_size,
            self.config.max_size,
        );
        let mut batch_index = 0usize;
        let threshold = Duration::from_millis(self.config.performance_threshold_ms);

        while !remaining.is_empty() {
            if self
                .stop
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::Relaxed))
            {
                log::info!("{name}: stop requested; {} items left undispatched", remaining.len());
                break;
            }

            let memory_sample = self.monitor.sample();
            let mut memory_forced_min = false;
            if let Some(sample) = &memory_sample {
                if self.monitor.over_critical(sample) {
                    if let Some(hook) = &self.cleanup_hook {
                        log::warn!(
                            "{name}: memory at {:.1}% of limit; running cleanup hook",
                            sample.used_percent
                        );
                        hook();
                    }
                }
                if self.monitor.over_emergency(sample) {
                    current_size = self.config.min_size;
                    memory_forced_min = true;
                }
            }

            let take = current_size.min(remaining.len());
            let batch: Vec<T> = remaining.drain(..take).collect();
            let started = Instant::now();
            let batch_results = process_with_concurrency(
                batch,
                processor.clone(),
                self.config.max_concurrency,
            )
            .await;
            let duration = started.elapsed();
            results.extend(batch_results);

            // Fast batches grow the next one, slow batches shrink it.
            if !memory_forced_min {
                #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
                if duration < threshold {
                    current_size = ((current_size as f64 * self.config.adjustment_factor) as usize)
                        .clamp(self.config.min_size, self.config.max_size);
                } else {
                    current_size = ((current_size as f64 / self.config.adjustment_factor) as usize)
                        .clamp(self.config.min_size, self.config.max_size);
                }
            }

            let report = BatchReport {
                index: batch_index,
                size: take,
                processed: results.len(),
                remaining: remaining.len(),
                duration,
                next_size: current_size,
                memory_forced_min,
                memory_sample,
            };
            on_batch(&report);
            batch_index += 1;
        }

        results
    }
}

/// Bounded worker pool: at most `max` items execute simultaneously; as each
/// finishes the next launches. Results preserve input order; a panicking
/// task surfaces as an error for its item only.
pub async fn process_with_concurrency<T, R, F, Fut>(
    items: Vec<T>,
    processor: F,
    max: usize,
) -> Vec<Result<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max.max(1)));
    let mut handles = Vec::with_capacity(items.len());

    for item in items {
        let semaphore = semaphore.clone();
        let processor = processor.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("pool semaphore never closes");
            processor(item).await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(
            handle
                .await
                .unwrap_or_else(|e| Err(IndexerError::Other(format!("worker task failed: {e}")))),
        );
    }
    results
}
