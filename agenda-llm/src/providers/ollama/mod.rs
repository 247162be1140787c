//! Ollama provider implementation (local models)

pub mod completion;
pub mod types;

pub use completion::{OllamaCompletionProvider, OllamaConfig};
