//! Default values for Delve configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

// ============================================================================
// LLM Defaults
// ============================================================================

/// Default LLM provider.
pub const DEFAULT_LLM_PROVIDER: &str = "openai";

/// Default max tokens for LLM responses.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default timeout for a single language-model call (seconds).
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;

// OpenAI defaults
/// Default OpenAI API URL.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
/// Default OpenAI model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

// Ollama defaults
/// Default Ollama API URL.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/v1";
/// Default Ollama model.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";

// OpenRouter defaults
/// Default OpenRouter API URL.
pub const DEFAULT_OPENROUTER_URL: &str = "https://openrouter.ai/api/v1";

// ============================================================================
// Search Defaults
// ============================================================================

/// Default execution strategy for the orchestrator.
pub const DEFAULT_SEARCH_STRATEGY: &str = "fallback";

/// Default number of results requested per query.
pub const DEFAULT_MAX_RESULTS: usize = 8;

/// Default timeout for a single provider call (seconds).
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 20;

/// Default SearXNG endpoint.
pub const DEFAULT_SEARXNG_URL: &str = "http://localhost:8888";

/// Default Tavily endpoint.
pub const DEFAULT_TAVILY_URL: &str = "https://api.tavily.com/search";

/// Total attempts per provider call (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 250;

/// Upper bound for a single backoff delay (milliseconds).
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 4_000;

/// Consecutive failures before a provider's circuit opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// How long an open circuit stays open (seconds).
pub const DEFAULT_CIRCUIT_COOLDOWN_SECS: u64 = 60;

/// Query cache capacity (entries).
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 512;

/// Query cache time-to-live (seconds).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3_600;

/// Maximum concurrent provider calls / fan-out tasks.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Minimum spacing between two calls through the same limiter (milliseconds).
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 0;

// ============================================================================
// Aggregator Defaults
// ============================================================================

/// Text similarity at or above which two hits are near-duplicates.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

/// Minimum final score for the primary tier.
pub const DEFAULT_PRIMARY_THRESHOLD: f64 = 0.6;

/// Minimum final score for the supporting tier.
pub const DEFAULT_SUPPORTING_THRESHOLD: f64 = 0.3;

/// Freshness half-life (days).
pub const DEFAULT_FRESHNESS_HALF_LIFE_DAYS: f64 = 30.0;

/// Weight of freshness when blending with relevance.
pub const DEFAULT_FRESHNESS_WEIGHT: f64 = 0.3;

/// Bonus added for recognized high-authority domains.
pub const DEFAULT_AUTHORITY_BONUS: f64 = 0.1;

/// Evidence items rendered per tier in the writer prompt.
pub const DEFAULT_MAX_ITEMS_PER_TIER: usize = 8;

/// Characters of content rendered per evidence item.
pub const DEFAULT_MAX_CHARS_PER_ITEM: usize = 600;

/// Characters of normalized content hashed into a fingerprint.
pub const FINGERPRINT_CHARS: usize = 400;

/// Characters of normalized content compared for similarity.
pub const SIMILARITY_CHARS: usize = 1_200;

/// Domains (or domain suffixes) that earn the authority bonus.
pub const AUTHORITY_DOMAINS: &[&str] = &[
    ".gov",
    ".edu",
    ".mil",
    ".int",
    "wikipedia.org",
    "arxiv.org",
    "nature.com",
    "science.org",
    "acm.org",
    "ieee.org",
    "nih.gov",
    "who.int",
    "europa.eu",
    "semanticscholar.org",
    "springer.com",
    "sciencedirect.com",
    "reuters.com",
    "apnews.com",
];

/// Query parameters removed during URL canonicalization.
pub const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "ref", "msclkid", "mc_cid", "mc_eid", "yclid", "igshid", "_ga",
];

/// Lexical markers that make a query time-sensitive.
pub const TIME_SENSITIVE_MARKERS: &[&str] = &[
    "latest",
    "today",
    "recent",
    "recently",
    "breaking",
    "current",
    "currently",
    "this week",
    "this month",
    "new release",
    "new version",
    "newest",
    "upcoming",
];

/// Words ignored by relevance term overlap.
pub const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "before", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has",
    "have", "how", "i", "if", "in", "into", "is", "it", "its", "me", "more", "most", "my", "no",
    "not", "of", "on", "or", "our", "out", "over", "should", "so", "some", "than", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "those", "to", "up", "us", "was",
    "we", "were", "what", "when", "where", "which", "who", "why", "will", "with", "would", "you",
    "your",
];

// ============================================================================
// Workflow Defaults
// ============================================================================

/// Maximum evaluate -> revise cycles per run.
pub const DEFAULT_MAX_REVISIONS: u32 = 2;

/// Maximum search calls the tool agent may issue.
pub const DEFAULT_MAX_TOOL_CALLS: u32 = 6;

/// Maximum queries in a deep plan.
pub const DEFAULT_MAX_QUERIES: usize = 5;

/// Maximum queries in a web (light) plan.
pub const DEFAULT_WEB_MAX_QUERIES: usize = 2;

/// Coverage below which a `revise` verdict asks for more evidence.
pub const DEFAULT_COVERAGE_FLOOR: f64 = 0.6;

/// Minimum fraction of claim sentences that must carry a citation.
pub const DEFAULT_CITATION_FLOOR: f64 = 0.6;

/// Upper bound for one fan-out search task (seconds).
pub const DEFAULT_SEARCH_TASK_TIMEOUT_SECS: u64 = 120;

/// Router confidence below which the run asks for clarification.
pub const DEFAULT_MIN_ROUTE_CONFIDENCE: f64 = 0.35;

/// Route names accepted as keys of `search.route_profiles`.
pub const ROUTE_NAMES: &[&str] = &["deep", "agent", "web", "direct", "clarify"];

// ============================================================================
// Storage Defaults
// ============================================================================

/// Default data directory.
pub const DEFAULT_DATA_DIR: &str = ".delve";

/// Default runs subdirectory.
pub const DEFAULT_RUNS_DIR: &str = "runs";

/// Default checkpoint file name.
pub const DEFAULT_CHECKPOINT_FILE: &str = "checkpoint.json";

/// Default current run pointer file name.
pub const DEFAULT_CURRENT_FILE: &str = "current";

/// Maximum length of response text quoted in error messages.
pub const DEFAULT_ERROR_CONTEXT_LENGTH: usize = 500;
