//! Concrete completion providers

pub mod ollama;

pub use ollama::{OllamaCompletionProvider, OllamaConfig};

use agenda_core::{AgendaError, LlmError};

pub(crate) fn request_failed(provider: &str, status: i32, message: impl Into<String>) -> AgendaError {
    AgendaError::Llm(LlmError::RequestFailed {
        provider: provider.to_string(),
        status,
        message: message.into(),
    })
}

pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> AgendaError {
    AgendaError::Llm(LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    })
}
