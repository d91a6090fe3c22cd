use std::sync::Arc;
use std::time::Duration;

use super::WorkflowError;
use crate::aggregate::ResultAggregator;
use crate::config::{Config, SearchConfig, WorkflowConfig};
use crate::llm::{Provider, LLM};
use crate::search::{ConcurrencyLimiter, QueryCache, SearchOrchestrator};

/// Everything a run needs, built once and shared by handle.
///
/// Tests build one around a scripted model and fake providers; the CLI
/// builds one from [`Config`].
pub struct ResearchServices {
    pub llm: Arc<dyn LLM>,
    pub orchestrator: Arc<SearchOrchestrator>,
    pub cache: Arc<QueryCache>,
    pub aggregator: ResultAggregator,
    /// Limiter for fan-out tasks; separate from the orchestrator's own.
    pub fan_out: ConcurrencyLimiter,
    pub workflow: WorkflowConfig,
    /// Source of the provider profiles applied to workflow searches.
    pub search: SearchConfig,
    pub llm_timeout: Duration,
}

impl ResearchServices {
    /// Wires an existing model and orchestrator with settings from `config`.
    pub fn new(llm: Arc<dyn LLM>, orchestrator: Arc<SearchOrchestrator>, config: &Config) -> Self {
        let fan_out = ConcurrencyLimiter::new(
            config
                .workflow
                .fan_out_limit(config.search.concurrency.max_concurrent),
            Duration::from_millis(config.search.concurrency.min_interval_ms),
        );
        Self {
            llm,
            cache: orchestrator.cache().clone(),
            orchestrator,
            aggregator: ResultAggregator::new(config.aggregator.clone()),
            fan_out,
            workflow: config.workflow.clone(),
            search: config.search.clone(),
            llm_timeout: config.llm.timeout(),
        }
    }

    /// Builds the model client, providers and cache described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, WorkflowError> {
        config.validate()?;
        let llm = Provider::build_from_config(&config.llm)?;
        let cache = Arc::new(QueryCache::from_config(&config.search.cache));
        let orchestrator = Arc::new(SearchOrchestrator::from_config(&config.search, cache));
        Ok(Self::new(llm, orchestrator, config))
    }
}
