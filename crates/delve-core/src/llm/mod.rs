mod error;
mod openai;
mod provider;

pub use error::LLMError;
pub use openai::OpenAIClient;
pub use provider::Provider;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Trait for Large Language Model providers.
///
/// This abstraction allows swapping between different LLM providers
/// without changing the rest of the code. The workflow engine only ever
/// talks to an `Arc<dyn LLM>`, so tests can substitute a scripted model.
///
/// # Supported Providers
///
/// - **OpenAI-compatible** (default): OpenAI, Azure, vLLM, OpenRouter, etc.
/// - **Ollama**: Local models via Ollama's OpenAI-compatible endpoint
///
/// # Example
///
/// ```ignore
/// use delve_core::llm::{Provider, LLM};
///
/// let llm = Provider::from_env()?;
/// let plan: serde_json::Value = llm
///     .complete_json("You plan searches.", "AI chip market 2024", r#"{"queries": ["..."]}"#)
///     .await?;
/// ```
#[async_trait]
pub trait LLM: Send + Sync {
    /// Complete a prompt and return the response.
    async fn complete(&self, prompt: &str) -> Result<String, LLMError>;

    /// Complete a prompt with a system message.
    async fn complete_with_system(&self, system: &str, prompt: &str)
        -> Result<String, LLMError>;

    /// Complete a prompt and parse the answer as JSON matching `schema`.
    ///
    /// The schema is appended to the system message as an example shape;
    /// markdown code fences around the answer are tolerated.
    async fn complete_json(
        &self,
        system: &str,
        prompt: &str,
        schema: &str,
    ) -> Result<serde_json::Value, LLMError> {
        let system = format!(
            "{system}\n\nIMPORTANT: Output valid JSON matching this exact structure:\n{schema}\n\nOnly output the JSON, no additional text."
        );
        let response = self.complete_with_system(&system, prompt).await?;
        let json_str = extract_json(&response);
        serde_json::from_str(json_str).map_err(|e| {
            LLMError::ParseError(format!(
                "{}. Response: {}",
                e,
                truncate_chars(json_str, crate::config::DEFAULT_ERROR_CONTEXT_LENGTH)
            ))
        })
    }
}

/// Blanket implementation for boxed trait objects.
#[async_trait]
impl LLM for Box<dyn LLM> {
    async fn complete(&self, prompt: &str) -> Result<String, LLMError> {
        (**self).complete(prompt).await
    }

    async fn complete_with_system(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<String, LLMError> {
        (**self).complete_with_system(system, prompt).await
    }

    async fn complete_json(
        &self,
        system: &str,
        prompt: &str,
        schema: &str,
    ) -> Result<serde_json::Value, LLMError> {
        (**self).complete_json(system, prompt, schema).await
    }
}

#[async_trait]
impl<T: LLM + ?Sized> LLM for Arc<T> {
    async fn complete(&self, prompt: &str) -> Result<String, LLMError> {
        (**self).complete(prompt).await
    }

    async fn complete_with_system(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<String, LLMError> {
        (**self).complete_with_system(system, prompt).await
    }

    async fn complete_json(
        &self,
        system: &str,
        prompt: &str,
        schema: &str,
    ) -> Result<serde_json::Value, LLMError> {
        (**self).complete_json(system, prompt, schema).await
    }
}

/// Calls [`LLM::complete_json`] and deserializes into a typed response.
pub async fn complete_typed<T: DeserializeOwned>(
    llm: &dyn LLM,
    system: &str,
    prompt: &str,
    schema: &str,
) -> Result<T, LLMError> {
    let value = llm.complete_json(system, prompt, schema).await?;
    serde_json::from_value(value).map_err(|e| LLMError::ParseError(e.to_string()))
}

/// Extracts JSON from a response that might be wrapped in markdown code blocks.
pub fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    // ```json ... ``` or ``` ... ```
    if trimmed.starts_with("```") {
        if let Some(start) = trimmed.find('\n') {
            let rest = &trimmed[start + 1..];
            if let Some(end) = rest.rfind("```") {
                return rest[..end].trim();
            }
        }
    }

    // Prose around a single object
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
            if start < end {
                return &trimmed[start..=end];
            }
        }
    }

    trimmed
}

/// Truncates to at most `max` characters on a char boundary.
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
