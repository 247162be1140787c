//! Ollama completion provider (`/api/generate`, non-streaming)

use super::types::{GenerateRequest, GenerateResponse, ListModelsResponse};
use crate::providers::{invalid_response, request_failed};
use crate::CompletionProvider;
use agenda_core::AgendaResult;
use async_trait::async_trait;
use reqwest::Client;

const PROVIDER: &str = "ollama";

/// Connection settings for a local Ollama server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaConfig {
    pub base_url: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
        }
    }
}

impl OllamaConfig {
    /// Reads `AGENDA_OLLAMA_URL`, falling back to the local default.
    pub fn from_env() -> Self {
        std::env::var("AGENDA_OLLAMA_URL")
            .ok()
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .map(|base_url| Self { base_url })
            .unwrap_or_default()
    }
}

/// Completion provider backed by Ollama.
///
/// Timeouts are applied by the caller (`complete_with_timeout`).
pub struct OllamaCompletionProvider {
    client: Client,
    base_url: String,
}

impl OllamaCompletionProvider {
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url,
        }
    }

    /// Names of locally installed models.
    pub async fn list_models(&self) -> AgendaResult<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await.map_err(|e| {
            request_failed(PROVIDER, 0, format!("Failed to connect to Ollama: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(request_failed(
                PROVIDER,
                status.as_u16() as i32,
                "model listing failed",
            ));
        }

        let list: ListModelsResponse = response.json().await.map_err(|e| {
            invalid_response(PROVIDER, format!("Failed to parse models list: {}", e))
        })?;
        Ok(list.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl CompletionProvider for OllamaCompletionProvider {
    async fn complete(&self, prompt: &str, model: &str) -> AgendaResult<String> {
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
        };

        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_failed(PROVIDER, 0, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(request_failed(PROVIDER, status.as_u16() as i32, error_text));
        }

        let generated: GenerateResponse = response.json().await.map_err(|e| {
            invalid_response(PROVIDER, format!("Failed to parse response: {}", e))
        })?;
        if !generated.done {
            tracing::warn!(model, "Ollama returned an unfinished generation");
        }
        Ok(generated.response)
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

impl std::fmt::Debug for OllamaCompletionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaCompletionProvider")
            .field("base_url", &self.base_url)
            .finish()
    }
}
