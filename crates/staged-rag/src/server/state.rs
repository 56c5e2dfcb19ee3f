//! Application state for the staged RAG server

use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::RagConfig;
use crate::error::Result;
use crate::ingestion::IngestPipeline;
use crate::pipeline::StageRunner;
use crate::providers::{self, Embedder, Generator};
use crate::retrieval::{KnowledgeBaseStore, VectorRetriever};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: RagConfig,
    /// Documents and chunks per knowledge base
    store: Arc<KnowledgeBaseStore>,
    /// Runs query pipelines
    runner: Arc<StageRunner>,
    /// Chunks, embeds, and stores uploads
    ingest: IngestPipeline,
    /// LLM provider, kept for health reporting
    generator: Arc<dyn Generator>,
    /// Ready state
    ready: RwLock<bool>,
}

impl AppState {
    /// Create application state from configuration
    pub async fn new(config: RagConfig) -> Result<Self> {
        tracing::info!(
            "Initializing staged RAG state (llm: {:?}, embeddings: {:?})...",
            config.llm.backend,
            config.embeddings.backend
        );

        let (generator, embedder) = providers::from_config(&config)?;

        let storage = config.storage.clone();
        let dimensions = config.embeddings.dimensions;
        let store = tokio::task::spawn_blocking(move || KnowledgeBaseStore::open(&storage, dimensions))
        .await
        .map_err(|e| crate::error::Error::Internal(format!("Task join error: {}", e)))??;
        tracing::info!(
            "Knowledge base store opened at {}",
            config.storage.data_dir.display()
        );

        match generator.health_check().await {
            Ok(true) => tracing::info!("LLM provider {} is reachable", generator.name()),
            _ => tracing::warn!(
                "LLM provider {} is not reachable; queries will fail until it is",
                generator.name()
            ),
        }

        let state = Self::from_parts(config, Arc::new(store), embedder, generator);
        state.set_ready(true);
        Ok(state)
    }

    /// Assemble state from already-built collaborators
    pub fn from_parts(
        config: RagConfig,
        store: Arc<KnowledgeBaseStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let retriever = Arc::new(VectorRetriever::new(store.clone(), embedder.clone()));
        let runner = Arc::new(StageRunner::new(
            retriever,
            generator.clone(),
            config.pipeline.clone(),
        ));
        let ingest = IngestPipeline::new(store.clone(), embedder, &config.chunking);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                runner,
                ingest,
                generator,
                ready: RwLock::new(false),
            }),
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<KnowledgeBaseStore> {
        &self.inner.store
    }

    pub fn runner(&self) -> &Arc<StageRunner> {
        &self.inner.runner
    }

    pub fn ingest(&self) -> &IngestPipeline {
        &self.inner.ingest
    }

    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.inner.generator
    }

    /// Check if ready
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }
}
