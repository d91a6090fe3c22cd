//! Retry and circuit breaking around provider calls.
//!
//! Every adapter invocation goes through [`ReliabilityWrapper::call`], which
//! records the outcome in a shared [`HealthRegistry`]. Failures never escape:
//! the caller gets a [`CallOutcome`] and decides what an empty answer means.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{SearchError, SearchProvider, SearchResult};
use crate::config::{CircuitConfig, RetryConfig};

/// Weight of the newest sample in the moving averages.
const EMA_ALPHA: f64 = 0.3;

/// Quality assumed for a provider with no successful calls yet.
const DEFAULT_QUALITY: f64 = 0.5;

/// Latency assumed for a provider with no successful calls yet.
const DEFAULT_LATENCY_SECS: f64 = 1.0;

/// Call statistics and circuit state for one provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderHealth {
    pub total_calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    /// Set while the circuit is open.
    pub circuit_opened_at: Option<Instant>,
    pub avg_latency_ms: Option<f64>,
    pub avg_quality: Option<f64>,
}

impl ProviderHealth {
    pub fn is_circuit_open(&self) -> bool {
        self.circuit_opened_at.is_some()
    }

    /// Fraction of successful calls; optimistic (1.0) before the first call.
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            1.0
        } else {
            self.successes as f64 / self.total_calls as f64
        }
    }

    /// `success_rate × avg_quality × 1/(1 + avg_latency_secs)`.
    pub fn composite_score(&self) -> f64 {
        let quality = self.avg_quality.unwrap_or(DEFAULT_QUALITY);
        let latency_secs = self
            .avg_latency_ms
            .map(|ms| ms / 1_000.0)
            .unwrap_or(DEFAULT_LATENCY_SECS);
        self.success_rate() * quality * (1.0 / (1.0 + latency_secs))
    }

    /// Whether a call may reach the adapter now.
    fn permits_call(&self, cooldown: Duration) -> bool {
        match self.circuit_opened_at {
            None => true,
            Some(opened_at) => opened_at.elapsed() >= cooldown,
        }
    }
}

fn ema(previous: Option<f64>, sample: f64) -> Option<f64> {
    Some(match previous {
        None => sample,
        Some(prev) => prev + EMA_ALPHA * (sample - prev),
    })
}

/// Thread-safe per-provider health table shared by all in-flight searches.
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    entries: Arc<Mutex<HashMap<String, ProviderHealth>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ProviderHealth>> {
        // A panic while holding the lock leaves plain counters behind; keep going.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of one provider's health (default when never called).
    pub fn get(&self, provider: &str) -> ProviderHealth {
        self.lock().get(provider).cloned().unwrap_or_default()
    }

    /// Snapshot of every provider seen so far.
    pub fn snapshot(&self) -> HashMap<String, ProviderHealth> {
        self.lock().clone()
    }

    /// Healthy means the circuit is closed or its cooldown has elapsed.
    pub fn is_healthy(&self, provider: &str, cooldown: Duration) -> bool {
        self.lock()
            .get(provider)
            .map_or(true, |health| health.permits_call(cooldown))
    }

    fn record_success(&self, provider: &str, latency: Duration, quality: f64) {
        let mut entries = self.lock();
        let health = entries.entry(provider.to_string()).or_default();
        let was_open = health.is_circuit_open();

        health.total_calls += 1;
        health.successes += 1;
        health.consecutive_failures = 0;
        health.circuit_opened_at = None;
        health.avg_latency_ms = ema(health.avg_latency_ms, latency.as_secs_f64() * 1_000.0);
        health.avg_quality = ema(health.avg_quality, quality);

        if was_open {
            info!(provider, "Circuit closed after successful probe");
        }
    }

    fn record_failure(&self, provider: &str, threshold: u32) {
        let mut entries = self.lock();
        let health = entries.entry(provider.to_string()).or_default();

        health.total_calls += 1;
        health.failures += 1;
        health.consecutive_failures += 1;

        if health.consecutive_failures >= threshold {
            if !health.is_circuit_open() {
                warn!(
                    provider,
                    failures = health.consecutive_failures,
                    "Circuit opened, provider will be skipped during cooldown"
                );
            }
            health.circuit_opened_at = Some(Instant::now());
        }
    }
}

/// Result of one wrapped provider call.
#[derive(Debug)]
pub enum CallOutcome {
    /// The provider answered with at least one hit.
    Hits(Vec<SearchResult>),
    /// The provider answered, but had nothing.
    Empty,
    /// The circuit was open; the adapter was not invoked.
    Skipped,
    /// Every attempt failed.
    Failed(SearchError),
}

impl CallOutcome {
    pub fn into_results(self) -> Vec<SearchResult> {
        match self {
            CallOutcome::Hits(results) => results,
            _ => Vec::new(),
        }
    }

    pub fn has_hits(&self) -> bool {
        matches!(self, CallOutcome::Hits(_))
    }
}

/// Retry + circuit breaker for provider calls.
#[derive(Debug, Clone)]
pub struct ReliabilityWrapper {
    retry: RetryConfig,
    circuit: CircuitConfig,
    timeout: Duration,
    health: HealthRegistry,
}

impl ReliabilityWrapper {
    pub fn new(retry: RetryConfig, circuit: CircuitConfig, timeout: Duration) -> Self {
        Self {
            retry,
            circuit,
            timeout,
            health: HealthRegistry::new(),
        }
    }

    /// Shares an existing health table instead of starting a fresh one.
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn is_healthy(&self, provider: &str) -> bool {
        self.health.is_healthy(provider, self.circuit.cooldown())
    }

    /// Calls the provider with timeout, retries and circuit checks.
    pub async fn call(
        &self,
        provider: &dyn SearchProvider,
        query: &str,
        max_results: usize,
    ) -> CallOutcome {
        let name = provider.name();
        let mut last_error = None;

        for attempt in 1..=self.retry.max_attempts {
            if !self.is_healthy(name) {
                debug!(provider = name, attempt, "Circuit open, skipping call");
                return match last_error {
                    Some(err) => CallOutcome::Failed(err),
                    None => CallOutcome::Skipped,
                };
            }

            let started = Instant::now();
            let call = tokio::time::timeout(self.timeout, provider.search(query, max_results));
            let error = match call.await {
                Ok(Ok(results)) => {
                    let quality = mean_score(&results);
                    self.health.record_success(name, started.elapsed(), quality);
                    debug!(provider = name, hits = results.len(), attempt, "Provider answered");
                    return if results.is_empty() {
                        CallOutcome::Empty
                    } else {
                        CallOutcome::Hits(stamp_query(results, query))
                    };
                }
                Ok(Err(err)) => err,
                Err(_) => SearchError::Timeout(self.timeout.as_millis()),
            };

            self.health.record_failure(name, self.circuit.failure_threshold);
            warn!(provider = name, attempt, error = %error, "Provider call failed");

            let retryable = error.is_transient() && attempt < self.retry.max_attempts;
            last_error = Some(error);
            if !retryable {
                break;
            }
            tokio::time::sleep(self.retry.backoff(attempt)).await;
        }

        match last_error {
            Some(err) => CallOutcome::Failed(err),
            None => CallOutcome::Skipped,
        }
    }
}

fn mean_score(results: &[SearchResult]) -> f64 {
    if results.is_empty() {
        0.0
    } else {
        results.iter().map(|r| r.score).sum::<f64>() / results.len() as f64
    }
}

fn stamp_query(mut results: Vec<SearchResult>, query: &str) -> Vec<SearchResult> {
    for result in &mut results {
        if result.search_query.is_empty() {
            result.search_query = query.to_string();
        }
    }
    results
}
