//! Text-to-vector collaborator used by ingestion and retrieval

use async_trait::async_trait;
use crate::error::Result;

/// Maps text to a dense vector. Queries and chunks of one knowledge base
/// must go through the same model for cosine scores to mean anything.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed every chunk of a document, in order. Fails on the first error.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Backend name shown in logs
    fn name(&self) -> &str;
}
