//! Concrete search backends, selected by `kind` in `[[search.providers]]`.

mod searxng;
mod tavily;

pub use searxng::SearxngProvider;
pub use tavily::TavilyProvider;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::warn;

use super::SearchProvider;
use crate::config::{ProviderConfig, SearchConfig};

const USER_AGENT: &str = concat!("delve/", env!("CARGO_PKG_VERSION"));

/// Builds every enabled provider in configuration order.
pub fn build_providers(config: &SearchConfig) -> Vec<Arc<dyn SearchProvider>> {
    let client = http_client(config.timeout());
    config
        .providers
        .iter()
        .filter(|p| p.enabled)
        .filter_map(|p| build_provider(p, client.clone()))
        .collect()
}

fn build_provider(config: &ProviderConfig, client: Client) -> Option<Arc<dyn SearchProvider>> {
    match config.kind.as_str() {
        "searxng" => Some(Arc::new(SearxngProvider::from_config(config, client))),
        "tavily" => Some(Arc::new(TavilyProvider::from_config(config, client))),
        other => {
            warn!(provider = %config.name, kind = other, "Unknown provider kind, skipping");
            None
        }
    }
}

fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| Client::new())
}
