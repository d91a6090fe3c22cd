//! Multi-provider search subsystem.
//!
//! Layers, leaves first: provider adapters ([`SearchProvider`]), the
//! [`ReliabilityWrapper`] around every adapter call, the [`QueryCache`], and
//! the [`SearchOrchestrator`] that applies a [`SearchStrategy`] across them.

mod cache;
mod error;
mod limiter;
mod orchestrator;
pub mod providers;
mod reliability;
mod result;
mod strategy;

pub use cache::{CacheEntry, CacheStats, QueryCache};
pub use error::SearchError;
pub use limiter::ConcurrencyLimiter;
pub use orchestrator::SearchOrchestrator;
pub use reliability::{CallOutcome, HealthRegistry, ProviderHealth, ReliabilityWrapper};
pub use result::SearchResult;
pub(crate) use result::{clamp_unit, parse_published};
pub use strategy::SearchStrategy;

use async_trait::async_trait;

/// A single external search backend.
///
/// Adapters only translate between a backend's wire format and
/// [`SearchResult`]; retries, timeouts and health tracking live in the
/// [`ReliabilityWrapper`].
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Unique name used in config, health records and provider profiles.
    fn name(&self) -> &str;

    /// Whether the adapter is configured well enough to be called.
    fn is_available(&self) -> bool {
        true
    }

    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<SearchResult>, SearchError>;
}
