use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{extract_json, truncate_chars, LLMError, LLM};
use crate::config::{
    LLMConfig, DEFAULT_ERROR_CONTEXT_LENGTH, DEFAULT_MAX_TOKENS, DEFAULT_OLLAMA_URL,
    DEFAULT_OPENAI_URL, DEFAULT_OPENROUTER_URL,
};

/// OpenAI-compatible chat completions client.
///
/// Covers OpenAI, OpenRouter, Ollama (`/v1`), vLLM, llama.cpp and any
/// other server speaking the chat completions protocol. Structured
/// requests ask the server for `json_object` output when it supports it.
pub struct OpenAIClient {
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    json_mode: bool,
    client: Client,
}

impl OpenAIClient {
    /// Creates a new OpenAI-compatible client.
    ///
    /// # Arguments
    /// * `base_url` - The API base URL (e.g., "https://api.openai.com/v1")
    /// * `api_key` - The API key (can be empty for local providers like Ollama)
    /// * `model` - The model name (e.g., "gpt-4o", "llama3")
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            json_mode: true,
            client: Client::new(),
        }
    }

    /// Builds a client from the `[llm]` config section.
    pub fn from_config(config: &LLMConfig) -> Self {
        Self::new(
            config.base_url_or_default(),
            config.api_key_or_env().unwrap_or_default(),
            config.model_or_default(),
        )
        .with_max_tokens(config.max_tokens)
        // Ollama rejects `response_format` on older releases.
        .with_json_mode(config.provider != "ollama")
    }

    /// Creates a client for OpenAI.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(DEFAULT_OPENAI_URL, api_key, model)
    }

    /// Creates a client for Ollama (local).
    pub fn ollama(model: impl Into<String>) -> Self {
        Self::new(DEFAULT_OLLAMA_URL, "", model).with_json_mode(false)
    }

    /// Creates a client for OpenRouter.
    pub fn openrouter(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(DEFAULT_OPENROUTER_URL, api_key, model)
    }

    /// Sets the maximum tokens for responses.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Enables or disables `response_format: json_object` for structured calls.
    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    async fn send_request(
        &self,
        prompt: &str,
        system: Option<&str>,
        json: bool,
    ) -> Result<String, LLMError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(sys) = system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: sys.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: Some(self.max_tokens),
            response_format: (json && self.json_mode).then(|| ResponseFormat {
                kind: "json_object".to_string(),
            }),
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, json, "chat completion request");

        let mut req = self
            .client
            .post(&url)
            .header("content-type", "application/json");

        // Local servers run without a key
        if !self.api_key.is_empty() {
            req = req.header("authorization", format!("Bearer {}", self.api_key));
        }

        let response = req.json(&request).send().await?;
        let status = response.status();

        if status == 429 {
            return Err(LLMError::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LLMError::ApiError {
                status: status.as_u16(),
                message: truncate_chars(&error_text, DEFAULT_ERROR_CONTEXT_LENGTH).to_string(),
            });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LLMError::EmptyResponse)
    }
}

#[async_trait]
impl LLM for OpenAIClient {
    async fn complete(&self, prompt: &str) -> Result<String, LLMError> {
        self.send_request(prompt, None, false).await
    }

    async fn complete_with_system(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<String, LLMError> {
        self.send_request(prompt, Some(system), false).await
    }

    async fn complete_json(
        &self,
        system: &str,
        prompt: &str,
        schema: &str,
    ) -> Result<serde_json::Value, LLMError> {
        let system = format!(
            "{system}\n\nIMPORTANT: Output valid JSON matching this exact structure:\n{schema}\n\nOnly output the JSON, no additional text."
        );
        let response = self.send_request(prompt, Some(&system), true).await?;
        let json_str = extract_json(&response);
        serde_json::from_str(json_str).map_err(|e| {
            LLMError::ParseError(format!(
                "{}. Response: {}",
                e,
                truncate_chars(json_str, DEFAULT_ERROR_CONTEXT_LENGTH)
            ))
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}
