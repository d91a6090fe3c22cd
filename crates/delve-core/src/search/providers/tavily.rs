use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ProviderConfig, DEFAULT_ERROR_CONTEXT_LENGTH, DEFAULT_TAVILY_URL};
use crate::llm::truncate_chars;
use crate::search::{parse_published, SearchError, SearchProvider, SearchResult};

/// Adapter for the Tavily search API.
pub struct TavilyProvider {
    name: String,
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl TavilyProvider {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: Option<String>,
        client: Client,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
        }
    }

    pub fn from_config(config: &ProviderConfig, client: Client) -> Self {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("TAVILY_API_KEY").ok());
        let endpoint = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_TAVILY_URL.to_string());
        Self::new(&config.name, endpoint, api_key, client)
    }
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let api_key = self.api_key.clone().ok_or_else(|| {
            SearchError::NotConfigured(self.name.clone(), "missing TAVILY_API_KEY".to_string())
        })?;

        let request = TavilyRequest {
            api_key,
            query: query.to_string(),
            max_results,
            search_depth: "advanced",
        };
        debug!(provider = %self.name, query, "Tavily request");

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        match status.as_u16() {
            429 => return Err(SearchError::RateLimited),
            401 | 403 => {
                return Err(SearchError::NotConfigured(
                    self.name.clone(),
                    "API key rejected".to_string(),
                ))
            }
            _ => {}
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::ApiError {
                status: status.as_u16(),
                message: truncate_chars(&body, DEFAULT_ERROR_CONTEXT_LENGTH).to_string(),
            });
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| SearchError::ParseError(e.to_string()))?;

        Ok(parsed
            .results
            .into_iter()
            .take(max_results)
            .map(|hit| {
                let mut result = SearchResult::new(hit.title, hit.url, hit.content, &self.name)
                    .with_score(hit.score.unwrap_or(0.5));
                if let Some(published) = hit.published_date.as_deref().and_then(parse_published) {
                    result = result.with_published_at(published);
                }
                result
            })
            .collect())
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest {
    api_key: String,
    query: String,
    max_results: usize,
    search_depth: &'static str,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Debug, Deserialize)]
struct TavilyHit {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    score: Option<f64>,
    published_date: Option<String>,
}
