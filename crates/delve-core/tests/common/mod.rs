//! Scripted model and fake providers shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use delve_core::config::{CircuitConfig, Config, RetryConfig};
use delve_core::llm::{LLMError, LLM};
use delve_core::search::{
    ConcurrencyLimiter, QueryCache, ReliabilityWrapper, SearchError, SearchOrchestrator,
    SearchProvider, SearchResult,
};
use delve_core::workflow::prompts::{
    CLARIFY_SYSTEM_PROMPT, DIRECT_ANSWER_SYSTEM_PROMPT, EVALUATOR_SYSTEM_PROMPT,
    PLANNER_SYSTEM_PROMPT, REFINE_SYSTEM_PROMPT, REVISER_SYSTEM_PROMPT, ROUTER_SYSTEM_PROMPT,
    TOOL_AGENT_SYSTEM_PROMPT, WRITER_SYSTEM_PROMPT,
};
use delve_core::workflow::ResearchServices;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Router,
    Clarify,
    Direct,
    Planner,
    Refine,
    ToolAgent,
    Writer,
    Evaluator,
    Reviser,
}

fn role_of(system: &str) -> Option<Role> {
    [
        (ROUTER_SYSTEM_PROMPT, Role::Router),
        (CLARIFY_SYSTEM_PROMPT, Role::Clarify),
        (DIRECT_ANSWER_SYSTEM_PROMPT, Role::Direct),
        (PLANNER_SYSTEM_PROMPT, Role::Planner),
        (REFINE_SYSTEM_PROMPT, Role::Refine),
        (TOOL_AGENT_SYSTEM_PROMPT, Role::ToolAgent),
        (WRITER_SYSTEM_PROMPT, Role::Writer),
        (EVALUATOR_SYSTEM_PROMPT, Role::Evaluator),
        (REVISER_SYSTEM_PROMPT, Role::Reviser),
    ]
    .into_iter()
    .find(|(prompt, _)| system.starts_with(prompt))
    .map(|(_, role)| role)
}

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail,
}

/// Model that answers by role from per-role queues.
///
/// The last reply of a queue repeats; a role with no script fails.
#[derive(Default)]
pub struct ScriptedLlm {
    scripts: Mutex<HashMap<Role, VecDeque<Reply>>>,
    calls: Mutex<Vec<Role>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, role: Role, reply: impl Into<String>) -> Self {
        self.push(role, Reply::Text(reply.into()));
        self
    }

    pub fn failing(self, role: Role) -> Self {
        self.push(role, Reply::Fail);
        self
    }

    fn push(&self, role: Role, reply: Reply) {
        self.scripts
            .lock()
            .unwrap()
            .entry(role)
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self, role: Role) -> usize {
        self.calls.lock().unwrap().iter().filter(|r| **r == role).count()
    }

    pub fn sequence(&self) -> Vec<Role> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLM for ScriptedLlm {
    async fn complete(&self, _prompt: &str) -> Result<String, LLMError> {
        Err(LLMError::EmptyResponse)
    }

    async fn complete_with_system(&self, system: &str, _prompt: &str) -> Result<String, LLMError> {
        let Some(role) = role_of(system) else {
            return Err(LLMError::EmptyResponse);
        };
        self.calls.lock().unwrap().push(role);

        let mut scripts = self.scripts.lock().unwrap();
        let reply = match scripts.get_mut(&role) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail) | None => Err(LLMError::Network("scripted failure".into())),
        }
    }
}

/// What a fake provider does on each call.
#[derive(Debug, Clone)]
pub enum Step {
    Hits(Vec<SearchResult>),
    Empty,
    RateLimited,
    Fatal,
    Hang,
}

/// Provider that plays a script of steps; the last step repeats.
pub struct FakeProvider {
    name: String,
    steps: Mutex<VecDeque<Step>>,
    delay: Duration,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new(name: &str, steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            steps: Mutex::new(steps.into()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        })
    }

    /// Answers every query with `count` distinct hits about that query.
    pub fn answering(name: &str, count: usize) -> Arc<Self> {
        let placeholders = (0..count)
            .map(|i| SearchResult::new(format!("#{i}"), "", "", ""))
            .collect();
        Self::new(name, vec![Step::Hits(placeholders)])
    }

    /// Like [`answering`](Self::answering), but every call takes `delay`.
    pub fn slow(name: &str, count: usize, delay: Duration) -> Arc<Self> {
        let mut provider = Self::answering(name, count);
        if let Some(provider) = Arc::get_mut(&mut provider) {
            provider.delay = delay;
        }
        provider
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step = {
            let mut steps = self.steps.lock().unwrap();
            if steps.len() > 1 {
                steps.pop_front()
            } else {
                steps.front().cloned()
            }
        };

        match step.unwrap_or(Step::Empty) {
            Step::Hits(hits) => Ok(hits
                .into_iter()
                .take(max_results)
                .map(|hit| personalize(hit, &self.name, query))
                .collect()),
            Step::Empty => Ok(Vec::new()),
            Step::RateLimited => Err(SearchError::RateLimited),
            Step::Fatal => Err(SearchError::NotConfigured(self.name.clone(), "no key".into())),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }
}

/// Placeholder hits (empty URL) become query-specific pages.
fn personalize(hit: SearchResult, provider: &str, query: &str) -> SearchResult {
    if !hit.url.is_empty() {
        return hit;
    }
    let slug: String = query
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let index: usize = hit.title.trim_start_matches('#').parse().unwrap_or(0);
    SearchResult::new(
        format!("{query} source {index}"),
        format!("https://{provider}.example.com/{slug}/{index}"),
        format!("{query}: {}", FILLER[index % FILLER.len()]),
        provider,
    )
    .with_score(0.8)
}

const FILLER: &[&str] = &[
    "Analysts expect demand to keep rising as data centers expand capacity worldwide.",
    "Supply constraints at leading foundries limited shipments during the first half.",
    "Pricing pressure from new entrants squeezed margins for established vendors.",
    "Regulators in several regions opened reviews of export rules and competition.",
];

pub fn hit(title: &str, url: &str, content: &str) -> SearchResult {
    SearchResult::new(title, url, content, "fake").with_score(0.7)
}

/// Retries without real waiting.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 2,
    }
}

pub fn orchestrator(providers: Vec<Arc<dyn SearchProvider>>) -> SearchOrchestrator {
    let cache = Arc::new(QueryCache::new(64, Duration::from_secs(60)));
    orchestrator_with(providers, CircuitConfig::default(), cache)
}

pub fn orchestrator_with(
    providers: Vec<Arc<dyn SearchProvider>>,
    circuit: CircuitConfig,
    cache: Arc<QueryCache>,
) -> SearchOrchestrator {
    let reliability = ReliabilityWrapper::new(fast_retry(), circuit, Duration::from_millis(200));
    let limiter = ConcurrencyLimiter::new(4, Duration::ZERO);
    SearchOrchestrator::new(providers, reliability, cache, limiter)
}

/// Services around a scripted model and the given providers.
pub fn services(
    llm: Arc<ScriptedLlm>,
    providers: Vec<Arc<dyn SearchProvider>>,
    config: &Config,
) -> Arc<ResearchServices> {
    Arc::new(ResearchServices::new(
        llm,
        Arc::new(orchestrator(providers)),
        config,
    ))
}

/// Services whose provider calls may run for up to `provider_timeout`.
pub fn services_with_provider_timeout(
    llm: Arc<ScriptedLlm>,
    providers: Vec<Arc<dyn SearchProvider>>,
    config: &Config,
    provider_timeout: Duration,
) -> Arc<ResearchServices> {
    let reliability =
        ReliabilityWrapper::new(fast_retry(), CircuitConfig::default(), provider_timeout);
    let orchestrator = SearchOrchestrator::new(
        providers,
        reliability,
        Arc::new(QueryCache::new(64, Duration::from_secs(60))),
        ConcurrencyLimiter::new(4, Duration::ZERO),
    );
    Arc::new(ResearchServices::new(llm, Arc::new(orchestrator), config))
}

pub fn planner_reply(queries: &[&str]) -> String {
    serde_json::json!({ "queries": queries }).to_string()
}

pub fn router_reply(route: &str, confidence: f64) -> String {
    serde_json::json!({ "route": route, "confidence": confidence, "reason": "test" }).to_string()
}

pub fn evaluator_reply(
    verdict: &str,
    coverage: f64,
    missing: &[&str],
    follow_ups: &[&str],
) -> String {
    serde_json::json!({
        "verdict": verdict,
        "coverage": coverage,
        "accuracy": 0.9,
        "freshness": 0.9,
        "coherence": 0.9,
        "missing_topics": missing,
        "follow_up_queries": follow_ups,
        "critique": "scripted critique",
    })
    .to_string()
}

/// A report whose only claim is cited.
pub const CITED_REPORT: &str = "# Report\n\nThe sector grew 12% in 2024 [1].\n\n## Sources\n\n[1] Source (https://a.example.com)";

/// A report whose claims carry no citations.
pub const UNCITED_REPORT: &str = "# Report\n\nThe sector grew 12% in 2024. Shipments reached 3 million units.";
