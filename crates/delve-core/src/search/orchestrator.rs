use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info};

use super::providers::build_providers;
use super::{
    CallOutcome, ConcurrencyLimiter, HealthRegistry, ProviderHealth, QueryCache,
    ReliabilityWrapper, SearchProvider, SearchResult, SearchStrategy,
};
use crate::config::SearchConfig;

/// Runs one query across the configured providers.
///
/// Results are cached by normalized query. Provider failures never surface:
/// the worst case is an empty list.
pub struct SearchOrchestrator {
    providers: Vec<Arc<dyn SearchProvider>>,
    reliability: ReliabilityWrapper,
    cache: Arc<QueryCache>,
    limiter: ConcurrencyLimiter,
    cursor: AtomicUsize,
    default_strategy: SearchStrategy,
    default_max_results: usize,
}

impl SearchOrchestrator {
    pub fn new(
        providers: Vec<Arc<dyn SearchProvider>>,
        reliability: ReliabilityWrapper,
        cache: Arc<QueryCache>,
        limiter: ConcurrencyLimiter,
    ) -> Self {
        Self {
            providers,
            reliability,
            cache,
            limiter,
            cursor: AtomicUsize::new(0),
            default_strategy: SearchStrategy::default(),
            default_max_results: crate::config::DEFAULT_MAX_RESULTS,
        }
    }

    /// Builds adapters and policies from the `[search]` section.
    pub fn from_config(config: &SearchConfig, cache: Arc<QueryCache>) -> Self {
        let reliability = ReliabilityWrapper::new(
            config.retry.clone(),
            config.circuit.clone(),
            config.timeout(),
        );
        let mut orchestrator = Self::new(
            build_providers(config),
            reliability,
            cache,
            ConcurrencyLimiter::from_config(&config.concurrency),
        );
        orchestrator.default_strategy = config.strategy;
        orchestrator.default_max_results = config.max_results;
        orchestrator
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.default_max_results = max_results;
        self
    }

    pub fn default_strategy(&self) -> SearchStrategy {
        self.default_strategy
    }

    pub fn default_max_results(&self) -> usize {
        self.default_max_results
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn health(&self) -> &HealthRegistry {
        self.reliability.health()
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Health of every configured provider, in configuration order.
    pub fn health_snapshot(&self) -> Vec<(String, ProviderHealth)> {
        let recorded = self.health().snapshot();
        self.providers
            .iter()
            .map(|p| {
                let name = p.name().to_string();
                let health = recorded.get(&name).cloned().unwrap_or_default();
                (name, health)
            })
            .collect()
    }

    /// Searches with the configured default strategy and result count.
    pub async fn search_default(&self, query: &str) -> Vec<SearchResult> {
        self.search(query, self.default_max_results, self.default_strategy, None)
            .await
    }

    /// Runs `query` with `strategy`.
    ///
    /// `profile` restricts and orders the provider pool for this call; when
    /// none of the named providers is usable the default pool is used.
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        strategy: SearchStrategy,
        profile: Option<&[String]>,
    ) -> Vec<SearchResult> {
        if let Some(mut cached) = self.cache.get_covering(query, max_results).await {
            cached.truncate(max_results);
            return cached;
        }

        let candidates = self.candidates(profile);
        if candidates.is_empty() {
            info!(query, "No available and healthy search providers");
            return Vec::new();
        }

        debug!(query, %strategy, providers = candidates.len(), "Dispatching search");
        let mut results = match strategy {
            SearchStrategy::Fallback => self.run_fallback(&candidates, query, max_results).await,
            SearchStrategy::Parallel => self.run_parallel(&candidates, query, max_results).await,
            SearchStrategy::RoundRobin => {
                let start = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
                let mut rotated = candidates;
                rotated.rotate_left(start);
                self.run_fallback(&rotated, query, max_results).await
            }
            SearchStrategy::BestFirst => {
                let ranked = self.rank_by_health(candidates);
                self.run_fallback(&ranked, query, max_results).await
            }
        };

        if !results.is_empty() {
            self.cache
                .set_requested(query, results.clone(), max_results)
                .await;
        }
        results.truncate(max_results);
        results
    }

    /// Available and healthy providers, honoring `profile` when possible.
    fn candidates(&self, profile: Option<&[String]>) -> Vec<Arc<dyn SearchProvider>> {
        let usable =
            |p: &Arc<dyn SearchProvider>| p.is_available() && self.reliability.is_healthy(p.name());

        if let Some(names) = profile.filter(|names| !names.is_empty()) {
            let selected: Vec<_> = names
                .iter()
                .filter_map(|name| self.providers.iter().find(|p| p.name() == name))
                .filter(|p| usable(p))
                .cloned()
                .collect();
            if !selected.is_empty() {
                return selected;
            }
            debug!(?names, "No profiled provider usable, using default pool");
        }

        self.providers.iter().filter(|p| usable(p)).cloned().collect()
    }

    fn rank_by_health(
        &self,
        mut providers: Vec<Arc<dyn SearchProvider>>,
    ) -> Vec<Arc<dyn SearchProvider>> {
        let scores: HashMap<String, f64> = providers
            .iter()
            .map(|p| (p.name().to_string(), self.health().get(p.name()).composite_score()))
            .collect();
        // stable sort keeps config order among equal scores
        providers.sort_by(|a, b| scores[b.name()].total_cmp(&scores[a.name()]));
        providers
    }

    async fn run_fallback(
        &self,
        providers: &[Arc<dyn SearchProvider>],
        query: &str,
        max_results: usize,
    ) -> Vec<SearchResult> {
        for provider in providers {
            match self.reliability.call(provider.as_ref(), query, max_results).await {
                CallOutcome::Hits(results) => {
                    info!(provider = provider.name(), hits = results.len(), "Search answered");
                    return results;
                }
                outcome => {
                    debug!(provider = provider.name(), ?outcome, "Trying next provider");
                }
            }
        }
        Vec::new()
    }

    async fn run_parallel(
        &self,
        providers: &[Arc<dyn SearchProvider>],
        query: &str,
        max_results: usize,
    ) -> Vec<SearchResult> {
        let calls = providers.iter().map(|provider| async move {
            let Ok(_permit) = self.limiter.acquire().await else {
                return Vec::new();
            };
            self.reliability
                .call(provider.as_ref(), query, max_results)
                .await
                .into_results()
        });

        let merged = merge_by_url(join_all(calls).await.into_iter().flatten());
        info!(providers = providers.len(), hits = merged.len(), "Parallel search merged");
        merged
    }
}

/// Merges hit lists by canonical URL, keeping the higher-scored copy, best first.
fn merge_by_url(results: impl IntoIterator<Item = SearchResult>) -> Vec<SearchResult> {
    let mut by_url: HashMap<String, SearchResult> = HashMap::new();
    for result in results {
        match by_url.get(&result.canonical_url) {
            Some(existing) if existing.score >= result.score => {}
            _ => {
                by_url.insert(result.canonical_url.clone(), result);
            }
        }
    }

    let mut merged: Vec<_> = by_url.into_values().collect();
    merged.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.canonical_url.cmp(&b.canonical_url))
    });
    merged
}
