//! Retriever trait used by the retrieve stage

use async_trait::async_trait;

use crate::error::Result;
use crate::types::SourceRef;

/// A chunk returned by retrieval, with its citation metadata
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    /// Chunk text
    pub text: String,
    /// Where the chunk came from
    pub source: SourceRef,
    /// Similarity score (higher is more similar)
    pub similarity: f32,
}

/// Trait for fetching the chunks relevant to a query
///
/// Implementations:
/// - `VectorRetriever`: embeds the query and searches the knowledge base store
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `top_k` chunks from `kb`, best first
    ///
    /// An empty list means nothing relevant is indexed and is not an error.
    /// An unknown knowledge base or unavailable storage is an error.
    async fn retrieve(
        &self,
        kb: &str,
        query: &str,
        document_id: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>>;

    /// Get retriever name for logging
    fn name(&self) -> &str;
}
