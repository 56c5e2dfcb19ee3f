//! Provider abstractions for generation, embeddings, and retrieval
//!
//! The stage pipeline only sees these traits, so hosted backends (Gemini,
//! Ollama) and test fakes are interchangeable.

pub mod embedding;
pub mod gemini;
pub mod generator;
pub mod ollama;
pub mod retriever;
mod retry;

pub use embedding::Embedder;
pub use gemini::GeminiClient;
pub use generator::Generator;
pub use ollama::OllamaClient;
pub use retriever::{RetrievedChunk, Retriever};

use std::sync::Arc;

use crate::config::{ProviderKind, RagConfig};
use crate::error::{Error, Result};

/// Build the generator and embedder selected by the configuration
pub fn from_config(config: &RagConfig) -> Result<(Arc<dyn Generator>, Arc<dyn Embedder>)> {
    let needs_gemini = config.llm.backend == ProviderKind::Gemini
        || config.embeddings.backend == ProviderKind::Gemini;
    let needs_ollama = config.llm.backend == ProviderKind::Ollama
        || config.embeddings.backend == ProviderKind::Ollama;

    let gemini = if needs_gemini {
        let api_key = config.llm.api_key.clone().ok_or_else(|| {
            Error::Config("Gemini backend selected but no API key is set".to_string())
        })?;
        Some(Arc::new(GeminiClient::new(&config.llm, &config.embeddings, api_key)?))
    } else {
        None
    };
    let ollama = if needs_ollama {
        Some(Arc::new(OllamaClient::new(&config.llm, &config.embeddings)?))
    } else {
        None
    };

    let generator: Arc<dyn Generator> = match (config.llm.backend, &gemini, &ollama) {
        (ProviderKind::Gemini, Some(client), _) => client.clone(),
        (ProviderKind::Ollama, _, Some(client)) => client.clone(),
        _ => return Err(Error::Config("No generation provider available".to_string())),
    };
    let embedder: Arc<dyn Embedder> = match (config.embeddings.backend, &gemini, &ollama) {
        (ProviderKind::Gemini, Some(client), _) => client.clone(),
        (ProviderKind::Ollama, _, Some(client)) => client.clone(),
        _ => return Err(Error::Config("No embedding provider available".to_string())),
    };

    tracing::info!(
        "Providers ready (generation: {} / {}, embeddings: {} / {})",
        generator.name(),
        generator.model(),
        embedder.name(),
        config.embeddings.model()
    );

    Ok((generator, embedder))
}
