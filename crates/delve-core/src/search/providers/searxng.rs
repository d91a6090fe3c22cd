use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::{ProviderConfig, DEFAULT_ERROR_CONTEXT_LENGTH, DEFAULT_SEARXNG_URL};
use crate::llm::truncate_chars;
use crate::search::{parse_published, SearchError, SearchProvider, SearchResult};

/// Adapter for a SearXNG instance's JSON API.
///
/// SearXNG scores are unbounded engine-vote sums, so they are normalized
/// against the best hit of each response.
pub struct SearxngProvider {
    name: String,
    base_url: String,
    client: Client,
}

impl SearxngProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, client: Client) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn from_config(config: &ProviderConfig, client: Client) -> Self {
        let base_url = config
            .base_url
            .clone()
            .or_else(|| std::env::var("SEARXNG_URL").ok())
            .unwrap_or_else(|| DEFAULT_SEARXNG_URL.to_string());
        Self::new(&config.name, base_url, client)
    }

    fn into_results(&self, response: SearxngResponse, max_results: usize) -> Vec<SearchResult> {
        let best = response
            .results
            .iter()
            .filter_map(|r| r.score)
            .fold(0.0_f64, f64::max);

        response
            .results
            .into_iter()
            .filter(|r| !r.url.is_empty())
            .take(max_results)
            .map(|r| {
                let score = match (r.score, best > 0.0) {
                    (Some(score), true) => score / best,
                    _ => 0.5,
                };
                let mut result = SearchResult::new(r.title, r.url, r.content, &self.name)
                    .with_score(score);
                if let Some(published) = r.published_date.as_deref().and_then(parse_published) {
                    result = result.with_published_at(published);
                }
                if let Some(engine) = r.engine {
                    result = result.with_raw(serde_json::json!({ "engine": engine }));
                }
                result
            })
            .collect()
    }
}

#[async_trait]
impl SearchProvider for SearxngProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        !self.base_url.is_empty()
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let url = format!("{}/search", self.base_url);
        debug!(provider = %self.name, query, "SearXNG request");

        let response = self
            .client
            .get(&url)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(SearchError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::ApiError {
                status: status.as_u16(),
                message: truncate_chars(&body, DEFAULT_ERROR_CONTEXT_LENGTH).to_string(),
            });
        }

        let parsed: SearxngResponse = response
            .json()
            .await
            .map_err(|e| SearchError::ParseError(e.to_string()))?;

        Ok(self.into_results(parsed, max_results))
    }
}

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngHit>,
}

#[derive(Debug, Deserialize)]
struct SearxngHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    score: Option<f64>,
    #[serde(rename = "publishedDate")]
    published_date: Option<String>,
    engine: Option<String>,
}
