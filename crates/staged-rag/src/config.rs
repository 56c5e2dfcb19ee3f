//! Configuration for the staged RAG service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Generation model configuration
    pub llm: LlmConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Stage pipeline configuration
    pub pipeline: PipelineConfig,
    /// Knowledge base storage configuration
    pub storage: StorageConfig,
}

impl RagConfig {
    /// Load configuration: defaults, then an optional TOML file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&raw)?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a (possibly partial) TOML document
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Apply environment overrides using the given lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("GOOGLE_API_KEY").filter(|k| !k.is_empty()) {
            self.llm.api_key = Some(key);
        }
        if let Some(host) = lookup("BACKEND_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("BACKEND_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.llm.ollama_base_url = url;
        }
        if let Some(path) = lookup("STORAGE_PATH") {
            self.storage.data_dir = PathBuf::from(path);
        }
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.max_refine_rounds == 0 {
            return Err(Error::Config(
                "pipeline.max_refine_rounds must be at least 1".to_string(),
            ));
        }
        if self.pipeline.top_k == 0 {
            return Err(Error::Config("pipeline.top_k must be at least 1".to_string()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.embeddings.dimensions == 0 {
            return Err(Error::Config("embeddings.dimensions must be at least 1".to_string()));
        }
        if self.storage.knowledge_bases.is_empty() {
            return Err(Error::Config(
                "storage.knowledge_bases must name at least one knowledge base".to_string(),
            ));
        }
        let needs_key = self.llm.backend == ProviderKind::Gemini
            || self.embeddings.backend == ProviderKind::Gemini;
        if needs_key && self.llm.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(Error::Config(
                "Gemini backend selected but no API key is set (GOOGLE_API_KEY)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Hosted model provider selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Generative Language API
    #[default]
    Gemini,
    /// Local Ollama server
    Ollama,
}

impl ProviderKind {
    /// Generation model used when none is configured
    pub fn default_generate_model(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini-1.5-flash",
            ProviderKind::Ollama => "llama3.2",
        }
    }

    /// Embedding model used when none is configured
    pub fn default_embed_model(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "text-embedding-004",
            ProviderKind::Ollama => "nomic-embed-text",
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum request body size in bytes (default: 10MB)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

/// Generation model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Which provider serves generation
    pub backend: ProviderKind,
    /// Gemini API base URL
    pub gemini_base_url: String,
    /// Ollama base URL
    pub ollama_base_url: String,
    /// API key for Gemini
    pub api_key: Option<String>,
    /// Generation model name (backend default when unset)
    pub generate_model: Option<String>,
    /// Temperature for generation
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: ProviderKind::Gemini,
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            api_key: None,
            generate_model: None,
            temperature: 0.7,
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

impl LlmConfig {
    /// Generation model to request from the selected backend
    pub fn model(&self) -> &str {
        self.generate_model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.backend.default_generate_model())
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider serves embeddings
    pub backend: ProviderKind,
    /// Embedding model name (backend default when unset)
    pub model: Option<String>,
    /// Vector length the index accepts; every embedding must match
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: ProviderKind::Gemini,
            model: None,
            dimensions: 768,
        }
    }
}

impl EmbeddingConfig {
    /// Embedding model to request from the selected backend
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.backend.default_embed_model())
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between chunks in characters
    pub chunk_overlap: usize,
    /// Minimum chunk size (skip smaller chunks)
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
            min_chunk_size: 20,
        }
    }
}

/// Stage pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Chunks fetched by the retrieve stage
    pub top_k: usize,
    /// Upper bound on critique/refine rounds
    pub max_refine_rounds: u32,
    /// Wall-clock budget for one request in seconds
    pub request_timeout_secs: u64,
    /// Capacity of the per-request event channel
    pub event_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_refine_rounds: 2,
            request_timeout_secs: 180,
            event_buffer: 16,
        }
    }
}

/// Knowledge base storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the document registry and vector indexes
    pub data_dir: PathBuf,
    /// Knowledge bases served by this instance
    pub knowledge_bases: Vec<String>,
    /// HNSW M parameter (connections per layer)
    pub hnsw_m: usize,
    /// HNSW ef_construction parameter
    pub hnsw_ef_construction: usize,
    /// HNSW ef_search parameter
    pub hnsw_ef_search: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("staged-rag")
            .join("kb");

        Self {
            data_dir,
            knowledge_bases: ["resumes", "api_docs", "recipes", "supplements"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            hnsw_m: 32,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 100,
        }
    }
}
