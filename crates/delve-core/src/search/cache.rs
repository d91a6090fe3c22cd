// LRU + TTL cache for search results, keyed by normalized query

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

use super::SearchResult;
use crate::config::CacheConfig;

/// One cached result list.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub results: Vec<SearchResult>,
    /// Result count the producing search asked each provider for.
    pub requested: usize,
    pub inserted_at: Instant,
    pub last_access: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }

    /// Whether this entry can answer a request for `max_results` hits.
    ///
    /// A list shorter than what was requested is complete; otherwise it only
    /// covers requests no larger than the original one.
    fn covers(&self, max_results: usize) -> bool {
        self.requested >= max_results || self.results.len() < self.requested
    }
}

/// Counters reported by [`QueryCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Bounded query cache shared by the orchestrator and fan-out tasks.
pub struct QueryCache {
    cache: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            ttl,
            enabled: true,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let mut cache = Self::new(config.max_entries, config.ttl());
        cache.enabled = config.enabled;
        cache
    }

    /// Lower-cased, trimmed, whitespace-collapsed form of a query.
    pub fn normalize(query: &str) -> String {
        query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Returns cached results unless absent or expired.
    pub async fn get(&self, query: &str) -> Option<Vec<SearchResult>> {
        self.lookup(query, 0).await
    }

    /// Like [`get`](Self::get), but misses when the entry was produced by a
    /// smaller request and may be missing hits beyond `max_results`.
    pub async fn get_covering(&self, query: &str, max_results: usize) -> Option<Vec<SearchResult>> {
        self.lookup(query, max_results).await
    }

    async fn lookup(&self, query: &str, max_results: usize) -> Option<Vec<SearchResult>> {
        if !self.enabled {
            return None;
        }
        let key = Self::normalize(query);
        let mut cache = self.cache.lock().await;

        let expired = match cache.get_mut(&key) {
            Some(entry) if !entry.is_expired() && entry.covers(max_results) => {
                entry.last_access = Instant::now();
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(query = %key, "Query cache hit");
                return Some(entry.results.clone());
            }
            Some(entry) => entry.is_expired(),
            None => false,
        };

        if expired {
            cache.pop(&key);
            debug!(query = %key, "Query cache entry expired");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Inserts or refreshes the entry for `query`, treating `results` as complete.
    pub async fn set(&self, query: &str, results: Vec<SearchResult>) {
        self.set_requested(query, results, usize::MAX).await;
    }

    /// Inserts or refreshes the entry for a search that asked for `requested` hits.
    pub async fn set_requested(&self, query: &str, results: Vec<SearchResult>, requested: usize) {
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        let entry = CacheEntry {
            results,
            requested,
            inserted_at: now,
            last_access: now,
            ttl: self.ttl,
        };
        self.cache.lock().await.put(Self::normalize(query), entry);
    }

    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.lock().await.len(),
        }
    }
}
