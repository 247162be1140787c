//! AGENDA LLM - Completion Provider Layer
//!
//! Provider-agnostic trait for prompt-in/text-out model calls, the
//! registry that hands the pipeline its conversational and code models,
//! the lenient JSON boundary for model output, and quality metrics.

pub mod json;
pub mod providers;
pub mod quality;

pub use json::{extract_first_json, unwrap_response_envelope};
pub use providers::{OllamaCompletionProvider, OllamaConfig};
pub use quality::{ErrorCount, QualityMonitor, QualityReport};

use agenda_core::{AgendaError, AgendaResult, LlmError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Longest prompt/output excerpt written to debug logs.
pub const LOG_EXCERPT_CHARS: usize = 2000;

// ============================================================================
// COMPLETION PROVIDER TRAIT
// ============================================================================

/// A language model behind a single call shape: prompt and model name in,
/// raw text out. Failure is an error, never a sentinel string.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete `prompt` with `model`.
    async fn complete(&self, prompt: &str, model: &str) -> AgendaResult<String>;

    /// Provider name used in errors and logs.
    fn name(&self) -> &str;
}

/// First `max` chars of `text`, on a char boundary.
pub fn excerpt(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Call `provider` with a hard deadline.
///
/// An elapsed deadline becomes `LlmError::Timeout`. Prompt and output are
/// logged at debug level, truncated.
pub async fn complete_with_timeout(
    provider: &dyn CompletionProvider,
    prompt: &str,
    model: &str,
    timeout: Duration,
) -> AgendaResult<String> {
    tracing::debug!(
        provider = provider.name(),
        model,
        prompt = excerpt(prompt, LOG_EXCERPT_CHARS),
        "Model request"
    );

    let output = match tokio::time::timeout(timeout, provider.complete(prompt, model)).await {
        Ok(result) => result?,
        Err(_) => {
            tracing::warn!(provider = provider.name(), model, timeout_ms = timeout.as_millis() as u64, "Model call timed out");
            return Err(AgendaError::Llm(LlmError::Timeout {
                provider: provider.name().to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }));
        }
    };

    tracing::debug!(
        provider = provider.name(),
        model,
        bytes_in = prompt.len(),
        bytes_out = output.len(),
        output = excerpt(&output, LOG_EXCERPT_CHARS),
        "Model response"
    );
    Ok(output)
}

// ============================================================================
// PROVIDER REGISTRY
// ============================================================================

/// Registry for the two model roles the pipeline uses.
/// Providers must be explicitly registered - no auto-discovery.
///
/// The conversational provider answers chat turns and writes summaries;
/// the code provider routes, proposes and repairs.
pub struct ProviderRegistry {
    convo: Option<Arc<dyn CompletionProvider>>,
    code: Option<Arc<dyn CompletionProvider>>,
}

impl ProviderRegistry {
    /// Create a new empty provider registry.
    pub fn new() -> Self {
        Self {
            convo: None,
            code: None,
        }
    }

    /// Registry with one provider serving both roles.
    pub fn single(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            convo: Some(provider.clone()),
            code: Some(provider),
        }
    }

    /// Register the conversational provider, replacing any previous one.
    pub fn register_convo(&mut self, provider: Arc<dyn CompletionProvider>) {
        self.convo = Some(provider);
    }

    /// Register the code provider, replacing any previous one.
    pub fn register_code(&mut self, provider: Arc<dyn CompletionProvider>) {
        self.code = Some(provider);
    }

    /// The conversational provider, or `ProviderNotConfigured`.
    pub fn convo(&self) -> AgendaResult<Arc<dyn CompletionProvider>> {
        self.convo
            .clone()
            .ok_or(AgendaError::Llm(LlmError::ProviderNotConfigured))
    }

    /// The code provider, or `ProviderNotConfigured`.
    pub fn code(&self) -> AgendaResult<Arc<dyn CompletionProvider>> {
        self.code
            .clone()
            .ok_or(AgendaError::Llm(LlmError::ProviderNotConfigured))
    }

    pub fn has_convo(&self) -> bool {
        self.convo.is_some()
    }

    pub fn has_code(&self) -> bool {
        self.code.is_some()
    }

    pub fn clear(&mut self) {
        self.convo = None;
        self.code = None;
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("convo", &self.convo.as_ref().map(|p| p.name().to_string()))
            .field("code", &self.code.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

// ============================================================================
// MOCK PROVIDER FOR TESTING
// ============================================================================

/// One scripted mock reply.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Text(String),
    /// Fail with `RequestFailed` (status 500)
    Fail,
    /// Never resolve; only a caller-side timeout ends the call.
    Hang,
}

impl MockReply {
    pub fn text(s: impl Into<String>) -> Self {
        MockReply::Text(s.into())
    }

    pub fn json(value: serde_json::Value) -> Self {
        MockReply::Text(value.to_string())
    }
}

#[derive(Debug, Default)]
struct MockState {
    rules: Vec<(String, MockReply)>,
    queue: VecDeque<MockReply>,
    prompts: Vec<(String, String)>,
}

/// Scripted completion provider.
///
/// Replies are chosen by, in order: the first rule whose needle appears in
/// the prompt, then the next queued reply, then the default reply.
#[derive(Debug)]
pub struct MockCompletionProvider {
    name: String,
    default_reply: MockReply,
    state: Mutex<MockState>,
}

impl MockCompletionProvider {
    /// Provider whose default reply is an empty JSON object.
    pub fn new() -> Self {
        Self::with_default(MockReply::text("{}"))
    }

    pub fn with_default(default_reply: MockReply) -> Self {
        Self {
            name: "mock".to_string(),
            default_reply,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Provider that fails every call.
    pub fn failing() -> Self {
        Self::with_default(MockReply::Fail)
    }

    /// Provider that never answers.
    pub fn hanging() -> Self {
        Self::with_default(MockReply::Hang)
    }

    /// Queue one reply, consumed by the next call no rule matches.
    pub fn push(&self, reply: MockReply) -> &Self {
        if let Ok(mut state) = self.state.lock() {
            state.queue.push_back(reply);
        }
        self
    }

    /// Answer every prompt containing `needle` with `reply`.
    pub fn on_prompt_containing(&self, needle: impl Into<String>, reply: MockReply) -> &Self {
        if let Ok(mut state) = self.state.lock() {
            state.rules.push((needle.into(), reply));
        }
        self
    }

    /// Every `(model, prompt)` received so far, oldest first.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .map(|s| s.prompts.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().map(|s| s.prompts.len()).unwrap_or(0)
    }

    fn next_reply(&self, prompt: &str, model: &str) -> MockReply {
        let Ok(mut state) = self.state.lock() else {
            return MockReply::Fail;
        };
        state.prompts.push((model.to_string(), prompt.to_string()));
        if let Some((_, reply)) = state.rules.iter().find(|(needle, _)| prompt.contains(needle.as_str())) {
            return reply.clone();
        }
        state
            .queue
            .pop_front()
            .unwrap_or_else(|| self.default_reply.clone())
    }
}

impl Default for MockCompletionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CompletionProvider for MockCompletionProvider {
    async fn complete(&self, prompt: &str, model: &str) -> AgendaResult<String> {
        match self.next_reply(prompt, model) {
            MockReply::Text(text) => Ok(text),
            MockReply::Fail => Err(AgendaError::Llm(LlmError::RequestFailed {
                provider: self.name.clone(),
                status: 500,
                message: "scripted failure".to_string(),
            })),
            MockReply::Hang => {
                std::future::pending::<()>().await;
                Err(AgendaError::Llm(LlmError::ProviderNotConfigured))
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_registry_new_is_empty() {
        let registry = ProviderRegistry::new();
        assert!(!registry.has_convo());
        assert!(!registry.has_code());
        assert!(matches!(
            registry.code(),
            Err(AgendaError::Llm(LlmError::ProviderNotConfigured))
        ));
    }

    #[test]
    fn test_provider_registry_single_serves_both_roles() {
        let mut registry = ProviderRegistry::single(Arc::new(MockCompletionProvider::new()));
        assert!(registry.has_convo());
        assert!(registry.has_code());
        registry.clear();
        assert!(registry.convo().is_err());
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("héllo", 2), "hé");
        assert_eq!(excerpt("abc", 10), "abc");
    }

    #[tokio::test]
    async fn test_mock_rules_before_queue_before_default() {
        let mock = MockCompletionProvider::with_default(MockReply::text("default"));
        mock.on_prompt_containing("ROUTE", MockReply::text("routed"));
        mock.push(MockReply::text("first"));

        assert_eq!(mock.complete("please ROUTE this", "m").await.unwrap(), "routed");
        assert_eq!(mock.complete("anything", "m").await.unwrap(), "first");
        assert_eq!(mock.complete("anything", "m").await.unwrap(), "default");
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.prompts()[0].0, "m");
    }

    #[tokio::test]
    async fn test_mock_failure_is_request_failed() {
        let mock = MockCompletionProvider::failing();
        let err = mock.complete("x", "m").await.unwrap_err();
        assert!(err.is_upstream());
    }

    #[tokio::test]
    async fn test_timeout_maps_to_llm_timeout() {
        let mock = MockCompletionProvider::hanging();
        let err = complete_with_timeout(&mock, "x", "m", Duration::from_millis(20))
            .await
            .unwrap_err();
        match err {
            AgendaError::Llm(LlmError::Timeout { provider, timeout_ms }) => {
                assert_eq!(provider, "mock");
                assert_eq!(timeout_ms, 20);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
