//! Configuration management for Delve.
//!
//! Configuration is loaded from multiple sources with the following priority:
//! 1. Environment variables (highest priority)
//! 2. Project-local `delve.toml` file
//! 3. User config `~/.config/delve/config.toml`
//! 4. Built-in defaults (lowest priority)
//!
//! Every load path ends in [`Config::validate`], so an invalid combination
//! is rejected before any engine is built from it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

mod defaults;

pub use defaults::*;

use crate::search::SearchStrategy;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration.
    pub llm: LLMConfig,

    /// Search subsystem configuration.
    pub search: SearchConfig,

    /// Evidence aggregation configuration.
    pub aggregator: AggregatorConfig,

    /// Workflow engine configuration.
    pub workflow: WorkflowConfig,

    /// Checkpoint storage configuration.
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Searches for config in order:
    /// 1. `./delve.toml` (project local)
    /// 2. `~/.config/delve/config.toml` (user config)
    /// 3. Falls back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        if Path::new("delve.toml").exists() {
            return Self::from_file("delve.toml");
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("delve").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text, apply env overrides, validate.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(provider) = std::env::var("DELVE_LLM_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Ok(model) = std::env::var("DELVE_LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Ok(url) = std::env::var("DELVE_LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Ok(key) = std::env::var("DELVE_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Ok(tokens) = std::env::var("DELVE_LLM_MAX_TOKENS") {
            if let Ok(n) = tokens.parse() {
                self.llm.max_tokens = n;
            }
        }

        if let Ok(strategy) = std::env::var("DELVE_SEARCH_STRATEGY") {
            self.search.strategy = strategy
                .parse()
                .map_err(ConfigError::Invalid)?;
        }
        if let Ok(revisions) = std::env::var("DELVE_MAX_REVISIONS") {
            if let Ok(n) = revisions.parse() {
                self.workflow.max_revisions = n;
            }
        }

        if let Ok(dir) = std::env::var("DELVE_DATA_DIR") {
            self.storage.data_dir = dir;
        }

        Ok(())
    }

    /// Rejects invalid values and combinations eagerly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.search.validate()?;
        self.aggregator.validate()?;
        self.workflow.validate()?;
        Ok(())
    }

    /// Create a default config file content as a string.
    pub fn default_config_string() -> String {
        Config::default().to_toml_string()
    }

    /// TOML rendering of this config. API keys are never written out.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

fn check_unit(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    /// Provider name: "openai", "openrouter", "ollama", or "openai-compatible".
    pub provider: String,

    /// Model name (provider-specific).
    pub model: Option<String>,

    /// Base URL for API (for openai-compatible providers).
    pub base_url: Option<String>,

    /// API key (can also be set via environment variable).
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Maximum tokens for response.
    pub max_tokens: u32,

    /// Timeout applied to every model call, in seconds.
    pub timeout_secs: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_LLM_PROVIDER.to_string(),
            model: None,
            base_url: None,
            api_key: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
        }
    }
}

impl LLMConfig {
    /// Get the model name, falling back to provider defaults.
    pub fn model_or_default(&self) -> String {
        self.model.clone().unwrap_or_else(|| match self.provider.as_str() {
            "ollama" => DEFAULT_OLLAMA_MODEL.to_string(),
            _ => DEFAULT_OPENAI_MODEL.to_string(),
        })
    }

    /// Get the base URL, falling back to provider defaults.
    pub fn base_url_or_default(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| match self.provider.as_str() {
            "ollama" => DEFAULT_OLLAMA_URL.to_string(),
            "openrouter" => DEFAULT_OPENROUTER_URL.to_string(),
            _ => DEFAULT_OPENAI_URL.to_string(),
        })
    }

    /// Get API key from config or environment.
    pub fn api_key_or_env(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("DELVE_LLM_API_KEY").ok())
            .or_else(|| match self.provider.as_str() {
                "openrouter" => std::env::var("OPENROUTER_API_KEY").ok(),
                "ollama" => None,
                _ => std::env::var("OPENAI_API_KEY").ok(),
            })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One configured search backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique name used in provider profiles and health reports.
    pub name: String,

    /// Adapter kind: "searxng" or "tavily".
    pub kind: String,

    /// Endpoint override.
    #[serde(default)]
    pub base_url: Option<String>,

    /// API key; when unset the adapter reads its kind's env variable.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Disabled providers are never built.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Search subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Providers in priority order.
    pub providers: Vec<ProviderConfig>,

    /// Default execution strategy.
    pub strategy: SearchStrategy,

    /// Results requested per query.
    pub max_results: usize,

    /// Timeout for a single provider call, in seconds.
    pub timeout_secs: u64,

    /// Providers workflow searches are restricted to, in order; empty uses all.
    pub profile: Vec<String>,

    pub retry: RetryConfig,

    pub circuit: CircuitConfig,

    pub cache: CacheConfig,

    pub concurrency: ConcurrencyConfig,

    /// Per-route replacements for `profile`, keyed by route name.
    pub route_profiles: BTreeMap<String, Vec<String>>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            providers: vec![ProviderConfig {
                name: "searxng".to_string(),
                kind: "searxng".to_string(),
                base_url: None,
                api_key: None,
                enabled: true,
            }],
            strategy: SearchStrategy::default(),
            max_results: DEFAULT_MAX_RESULTS,
            timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            profile: Vec::new(),
            retry: RetryConfig::default(),
            circuit: CircuitConfig::default(),
            cache: CacheConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            route_profiles: BTreeMap::new(),
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Provider profile for searches made on `route`, if any.
    ///
    /// A route entry replaces the global profile; an empty list means every
    /// provider.
    pub fn profile_for(&self, route: Option<&str>) -> Option<&[String]> {
        let names = route
            .and_then(|route| self.route_profiles.get(route))
            .unwrap_or(&self.profile);
        (!names.is_empty()).then_some(names.as_slice())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_results == 0 {
            return Err(ConfigError::Invalid("search.max_results must be > 0".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("search.timeout_secs must be > 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "search.retry.max_attempts must be >= 1".into(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(
                "search.retry.base_delay_ms exceeds max_delay_ms".into(),
            ));
        }
        if self.circuit.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "search.circuit.failure_threshold must be >= 1".into(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid("search.cache.max_entries must be > 0".into()));
        }
        if self.concurrency.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "search.concurrency.max_concurrent must be > 0".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if !matches!(provider.kind.as_str(), "searxng" | "tavily") {
                return Err(ConfigError::Invalid(format!(
                    "unknown search provider kind '{}' for '{}'",
                    provider.kind, provider.name
                )));
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate search provider name '{}'",
                    provider.name
                )));
            }
        }

        for route in self.route_profiles.keys() {
            if !ROUTE_NAMES.contains(&route.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "unknown route '{route}' in search.route_profiles"
                )));
            }
        }
        let profiled = self.profile.iter().chain(self.route_profiles.values().flatten());
        for name in profiled {
            if !seen.contains(name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "search profile names unknown provider '{name}'"
                )));
            }
        }
        Ok(())
    }
}

/// Retry policy for provider calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call, first try included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BACKOFF_BASE_MS,
            max_delay_ms: DEFAULT_BACKOFF_MAX_MS,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// Circuit breaker policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    pub failure_threshold: u32,
    /// Cooldown in milliseconds.
    pub cooldown_ms: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown_ms: DEFAULT_CIRCUIT_COOLDOWN_SECS * 1_000,
        }
    }
}

impl CircuitConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Query cache policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    /// Time-to-live in milliseconds.
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            ttl_ms: DEFAULT_CACHE_TTL_SECS * 1_000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Bounded concurrency for provider calls and fan-out tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub max_concurrent: usize,
    pub min_interval_ms: u64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
        }
    }
}

/// Evidence aggregation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub similarity_threshold: f64,
    pub primary_threshold: f64,
    pub supporting_threshold: f64,
    pub freshness_half_life_days: f64,
    pub freshness_weight: f64,
    pub authority_bonus: f64,
    pub max_items_per_tier: usize,
    pub max_chars_per_item: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            primary_threshold: DEFAULT_PRIMARY_THRESHOLD,
            supporting_threshold: DEFAULT_SUPPORTING_THRESHOLD,
            freshness_half_life_days: DEFAULT_FRESHNESS_HALF_LIFE_DAYS,
            freshness_weight: DEFAULT_FRESHNESS_WEIGHT,
            authority_bonus: DEFAULT_AUTHORITY_BONUS,
            max_items_per_tier: DEFAULT_MAX_ITEMS_PER_TIER,
            max_chars_per_item: DEFAULT_MAX_CHARS_PER_ITEM,
        }
    }
}

impl AggregatorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_unit("aggregator.similarity_threshold", self.similarity_threshold)?;
        check_unit("aggregator.primary_threshold", self.primary_threshold)?;
        check_unit("aggregator.supporting_threshold", self.supporting_threshold)?;
        check_unit("aggregator.freshness_weight", self.freshness_weight)?;
        check_unit("aggregator.authority_bonus", self.authority_bonus)?;
        if self.supporting_threshold > self.primary_threshold {
            return Err(ConfigError::Invalid(
                "aggregator.supporting_threshold exceeds primary_threshold".into(),
            ));
        }
        if self.freshness_half_life_days <= 0.0 {
            return Err(ConfigError::Invalid(
                "aggregator.freshness_half_life_days must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// How fan-out search tasks are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One task at a time.
    Sequential,
    /// Up to `search.concurrency.max_concurrent` tasks at once.
    #[default]
    Parallel,
}

/// Workflow engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub max_revisions: u32,
    pub max_tool_calls: u32,
    pub max_queries: usize,
    pub web_max_queries: usize,
    pub execution: ExecutionMode,
    /// Suspend at `human_review` and wait for a decision.
    pub review_enabled: bool,
    /// Route `deep` requests to the self-contained `deep_research` node.
    pub deep_subpipeline: bool,
    pub coverage_floor: f64,
    pub citation_floor: f64,
    pub min_route_confidence: f64,
    /// Upper bound for one fan-out search task, in seconds.
    pub search_task_timeout_secs: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_revisions: DEFAULT_MAX_REVISIONS,
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
            max_queries: DEFAULT_MAX_QUERIES,
            web_max_queries: DEFAULT_WEB_MAX_QUERIES,
            execution: ExecutionMode::default(),
            review_enabled: false,
            deep_subpipeline: false,
            coverage_floor: DEFAULT_COVERAGE_FLOOR,
            citation_floor: DEFAULT_CITATION_FLOOR,
            min_route_confidence: DEFAULT_MIN_ROUTE_CONFIDENCE,
            search_task_timeout_secs: DEFAULT_SEARCH_TASK_TIMEOUT_SECS,
        }
    }
}

impl WorkflowConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_unit("workflow.coverage_floor", self.coverage_floor)?;
        check_unit("workflow.citation_floor", self.citation_floor)?;
        check_unit("workflow.min_route_confidence", self.min_route_confidence)?;
        if self.max_queries == 0 || self.web_max_queries == 0 {
            return Err(ConfigError::Invalid(
                "workflow.max_queries and web_max_queries must be > 0".into(),
            ));
        }
        if self.search_task_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "workflow.search_task_timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn search_task_timeout(&self) -> Duration {
        Duration::from_secs(self.search_task_timeout_secs)
    }

    /// Fan-out concurrency for the configured execution mode.
    pub fn fan_out_limit(&self, max_concurrent: usize) -> usize {
        match self.execution {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Parallel => max_concurrent.max(1),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for delve data (default: ".delve").
    pub data_dir: String,

    /// Runs subdirectory name.
    pub runs_dir: String,

    /// Checkpoint file name.
    pub checkpoint_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: DEFAULT_DATA_DIR.to_string(),
            runs_dir: DEFAULT_RUNS_DIR.to_string(),
            checkpoint_file: DEFAULT_CHECKPOINT_FILE.to_string(),
        }
    }
}

impl StorageConfig {
    /// Get the full path to the runs directory.
    pub fn runs_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.runs_dir)
    }

    /// Get the full path to a run directory.
    pub fn run_path(&self, run_id: &str) -> PathBuf {
        self.runs_path().join(run_id)
    }
}
