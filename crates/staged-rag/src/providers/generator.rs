//! Generator trait for LLM text generation

use async_trait::async_trait;
use crate::error::Result;

/// Trait for prompt-in, text-out generation
///
/// Implementations:
/// - `GeminiClient`: Google Generative Language API (gemini-1.5-flash, etc.)
/// - `OllamaClient`: Local Ollama server (llama3.2, phi3, etc.)
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate text from a system instruction and a user prompt
    ///
    /// Fails with `Error::Llm` on transport, quota, or malformed-response errors.
    async fn generate(&self, system: &str, prompt: &str) -> Result<String>;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
