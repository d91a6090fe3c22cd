use std::sync::Arc;

use super::{LLMError, OpenAIClient, LLM};
use crate::config::{LLMConfig, DEFAULT_OLLAMA_MODEL, DEFAULT_OPENAI_MODEL};

/// LLM Provider configuration.
#[derive(Debug, Clone)]
pub enum Provider {
    /// OpenAI-compatible endpoint (default, most universal)
    OpenAI {
        base_url: Option<String>,
        api_key: Option<String>,
        model: Option<String>,
    },
    /// OpenRouter model gateway
    OpenRouter {
        api_key: Option<String>,
        model: Option<String>,
    },
    /// Local Ollama instance
    Ollama {
        base_url: Option<String>,
        model: String,
    },
}

impl Default for Provider {
    fn default() -> Self {
        Provider::OpenAI {
            base_url: None,
            api_key: None,
            model: None,
        }
    }
}

impl Provider {
    /// Creates a provider from LLMConfig.
    pub fn from_config(config: &LLMConfig) -> Result<Self, LLMError> {
        match config.provider.as_str() {
            "openai" | "openai-compatible" => Ok(Provider::OpenAI {
                base_url: config.base_url.clone(),
                api_key: config.api_key.clone(),
                model: config.model.clone(),
            }),
            "openrouter" => Ok(Provider::OpenRouter {
                api_key: config.api_key.clone(),
                model: config.model.clone(),
            }),
            "ollama" => Ok(Provider::Ollama {
                base_url: config.base_url.clone(),
                model: config
                    .model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            }),
            other => Err(LLMError::UnknownProvider(other.to_string())),
        }
    }

    /// Creates an LLM client from the provider configuration.
    pub fn build(self, max_tokens: u32) -> Result<Arc<dyn LLM>, LLMError> {
        match self {
            Provider::OpenAI {
                base_url,
                api_key,
                model,
            } => {
                let config = LLMConfig {
                    provider: "openai".to_string(),
                    base_url: base_url.or_else(|| std::env::var("OPENAI_BASE_URL").ok()),
                    api_key,
                    model: model.or_else(|| std::env::var("OPENAI_MODEL").ok()),
                    max_tokens,
                    ..LLMConfig::default()
                };
                Ok(Arc::new(OpenAIClient::from_config(&config)))
            }

            Provider::OpenRouter { api_key, model } => {
                let config = LLMConfig {
                    provider: "openrouter".to_string(),
                    api_key,
                    model: Some(model.unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string())),
                    max_tokens,
                    ..LLMConfig::default()
                };
                if config.api_key_or_env().is_none() {
                    return Err(LLMError::MissingApiKey);
                }
                Ok(Arc::new(OpenAIClient::from_config(&config)))
            }

            Provider::Ollama { base_url, model } => {
                let base = base_url
                    .or_else(|| std::env::var("OLLAMA_HOST").ok())
                    .map(|h| {
                        let h = h.trim_end_matches('/');
                        if h.ends_with("/v1") {
                            h.to_string()
                        } else {
                            format!("{h}/v1")
                        }
                    });
                let config = LLMConfig {
                    provider: "ollama".to_string(),
                    base_url: base,
                    model: Some(model),
                    max_tokens,
                    ..LLMConfig::default()
                };
                Ok(Arc::new(OpenAIClient::from_config(&config)))
            }
        }
    }

    /// Builds the client described by the `[llm]` config section.
    pub fn build_from_config(config: &LLMConfig) -> Result<Arc<dyn LLM>, LLMError> {
        Self::from_config(config)?.build(config.max_tokens)
    }

    /// Auto-detect provider from environment variables.
    ///
    /// Detection order:
    /// 1. DELVE_LLM_PROVIDER explicitly set
    /// 2. OPENROUTER_API_KEY set → OpenRouter
    /// 3. OPENAI_API_KEY set → OpenAI
    /// 4. OLLAMA_HOST set → Ollama
    /// 5. Default to OpenAI-compatible (works with local servers too)
    pub fn from_env() -> Result<Arc<dyn LLM>, LLMError> {
        let config = LLMConfig::default();

        if let Ok(provider) = std::env::var("DELVE_LLM_PROVIDER") {
            let config = LLMConfig {
                provider: provider.to_lowercase(),
                model: std::env::var("DELVE_LLM_MODEL").ok(),
                base_url: std::env::var("DELVE_LLM_BASE_URL").ok(),
                ..config
            };
            return Self::build_from_config(&config);
        }

        if std::env::var("OPENROUTER_API_KEY").is_ok() {
            return Provider::OpenRouter {
                api_key: None,
                model: None,
            }
            .build(config.max_tokens);
        }

        if std::env::var("OLLAMA_HOST").is_ok() && std::env::var("OPENAI_API_KEY").is_err() {
            let model = std::env::var("OLLAMA_MODEL")
                .unwrap_or_else(|_| DEFAULT_OLLAMA_MODEL.to_string());
            return Provider::Ollama {
                base_url: None,
                model,
            }
            .build(config.max_tokens);
        }

        Provider::default().build(config.max_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_provider() {
        let provider = Provider::default();
        assert!(matches!(provider, Provider::OpenAI { .. }));
    }

    #[test]
    fn test_ollama_provider_build() {
        let provider = Provider::Ollama {
            base_url: Some("http://gpu-box:11434".to_string()),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
        };
        assert!(provider.build(1024).is_ok());
    }

    #[test]
    fn test_from_config() {
        let config = LLMConfig {
            provider: "ollama".to_string(),
            model: Some("qwen2".to_string()),
            ..LLMConfig::default()
        };

        let provider = Provider::from_config(&config).unwrap();
        assert!(matches!(provider, Provider::Ollama { model, .. } if model == "qwen2"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = LLMConfig {
            provider: "carrier-pigeon".to_string(),
            ..LLMConfig::default()
        };
        assert!(matches!(
            Provider::from_config(&config),
            Err(LLMError::UnknownProvider(_))
        ));
    }
}
