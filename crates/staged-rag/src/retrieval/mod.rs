//! Knowledge base storage and embedding-based retrieval

pub mod index;
pub mod registry;
pub mod store;

pub use store::KnowledgeBaseStore;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::providers::{Embedder, RetrievedChunk, Retriever};

/// Retriever that embeds the query and searches the knowledge base store
pub struct VectorRetriever {
    store: Arc<KnowledgeBaseStore>,
    embedder: Arc<dyn Embedder>,
}

impl VectorRetriever {
    pub fn new(store: Arc<KnowledgeBaseStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(
        &self,
        kb: &str,
        query: &str,
        document_id: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        // Unknown knowledge bases fail before spending an embedding call
        if self.store.chunk_count(kb)? == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query).await?;
        let results = self.store.search(kb, &embedding, document_id, top_k)?;

        tracing::debug!(
            "Retrieved {} chunks from '{}' via {} (best similarity {:.3})",
            results.len(),
            kb,
            self.embedder.name(),
            results.first().map_or(0.0, |c| c.similarity)
        );
        Ok(results)
    }

    fn name(&self) -> &str {
        "vector"
    }
}
