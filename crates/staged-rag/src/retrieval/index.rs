//! HNSW chunk index for one knowledge base, backed by ruvector-core

use ruvector_core::types::{DbOptions, HnswConfig};
use ruvector_core::{DistanceMetric, SearchQuery, VectorDB, VectorEntry};
use std::collections::HashMap;
use std::path::Path;

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::types::StoredChunk;

/// A chunk ID with its cosine similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkHit {
    pub chunk_id: String,
    pub similarity: f32,
}

/// Cosine-metric vector index over the chunks of one knowledge base
pub struct ChunkIndex {
    db: VectorDB,
    dimensions: usize,
    ef_search: usize,
}

impl ChunkIndex {
    /// Create an empty index at `path`, replacing any previous index file
    pub fn create(path: &Path, dimensions: usize, config: &StorageConfig) -> Result<Self> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let mut options = DbOptions::default();
        options.dimensions = dimensions;
        options.distance_metric = DistanceMetric::Cosine;
        options.storage_path = path.to_string_lossy().to_string();
        options.hnsw_config = Some(HnswConfig {
            m: config.hnsw_m,
            ef_construction: config.hnsw_ef_construction,
            ef_search: config.hnsw_ef_search,
            max_elements: 1_000_000,
        });
        options.quantization = None;

        Ok(Self {
            db: VectorDB::new(options).map_err(|e| Error::VectorDb(e.to_string()))?,
            dimensions,
            ef_search: config.hnsw_ef_search,
        })
    }

    /// Index every chunk, or none of them
    pub fn insert(&self, chunks: &[StoredChunk]) -> Result<()> {
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != self.dimensions) {
            return Err(Error::embedding(format!(
                "Chunk {} has {} dimensions, index expects {}",
                bad.id,
                bad.embedding.len(),
                self.dimensions
            )));
        }

        for (i, chunk) in chunks.iter().enumerate() {
            let mut metadata = HashMap::new();
            metadata.insert("document_id".to_string(), serde_json::json!(chunk.document_id));
            metadata.insert("chunk_index".to_string(), serde_json::json!(chunk.chunk_index));

            let entry = VectorEntry {
                id: Some(chunk.id.clone()),
                vector: chunk.embedding.clone(),
                metadata: Some(metadata),
            };

            if let Err(e) = self.db.insert(entry) {
                self.remove(chunks[..i].iter().map(|c| c.id.as_str()));
                return Err(Error::VectorDb(e.to_string()));
            }
        }
        Ok(())
    }

    /// Drop chunks from the index; unknown IDs are ignored
    pub fn remove<'a>(&self, chunk_ids: impl IntoIterator<Item = &'a str>) {
        for id in chunk_ids {
            if let Err(e) = self.db.delete(id) {
                tracing::warn!("Failed to remove chunk {} from index: {}", id, e);
            }
        }
    }

    pub fn len(&self) -> Result<usize> {
        self.db.len().map_err(|e| Error::VectorDb(e.to_string()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Nearest chunks to `query`, best first, optionally limited to one document
    pub fn search(&self, query: &[f32], top_k: usize, document_id: Option<&str>) -> Result<Vec<ChunkHit>> {
        if query.len() != self.dimensions {
            return Err(Error::retrieval(format!(
                "Query embedding has {} dimensions, index expects {}",
                query.len(),
                self.dimensions
            )));
        }

        let total = self.len()?;
        if total == 0 || top_k == 0 {
            return Ok(Vec::new());
        }

        // Document scoping is a post-filter, so a scoped search ranks the whole index
        let k = match document_id {
            Some(_) => total,
            None => top_k.min(total),
        };

        let results = self
            .db
            .search(SearchQuery {
                vector: query.to_vec(),
                k,
                filter: None,
                ef_search: Some(self.ef_search.max(k)),
            })
            .map_err(|e| Error::VectorDb(e.to_string()))?;

        let mut hits: Vec<ChunkHit> = results
            .into_iter()
            .filter(|r| {
                document_id.map_or(true, |id| {
                    r.metadata
                        .as_ref()
                        .and_then(|m| m.get("document_id"))
                        .and_then(|v| v.as_str())
                        == Some(id)
                })
            })
            .map(|r| ChunkHit {
                chunk_id: r.id,
                similarity: 1.0 - r.score,
            })
            .collect();

        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(id: &str, document_id: &str, embedding: Vec<f32>) -> StoredChunk {
        StoredChunk {
            id: id.to_string(),
            document_id: document_id.to_string(),
            chunk_index: 0,
            content: String::new(),
            embedding,
        }
    }

    fn index(dir: &TempDir) -> ChunkIndex {
        ChunkIndex::create(&dir.path().join("recipes.vectors.db"), 2, &StorageConfig::default()).unwrap()
    }

    #[test]
    fn test_nearest_first() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);
        index
            .insert(&[
                chunk("up", "d1", vec![0.0, 1.0]),
                chunk("right", "d1", vec![1.0, 0.0]),
                chunk("diagonal", "d2", vec![0.7, 0.7]),
            ])
            .unwrap();

        let hits = index.search(&[1.0, 0.05], 2, None).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["right", "diagonal"]);
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[test]
    fn test_document_filter() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);
        index
            .insert(&[
                chunk("oats", "d1", vec![1.0, 0.0]),
                chunk("soup", "d2", vec![0.0, 1.0]),
            ])
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 5, Some("d2")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "soup");
    }

    #[test]
    fn test_wrong_dimensions_rejected() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        let err = index
            .insert(&[chunk("ok", "d1", vec![1.0, 0.0]), chunk("bad", "d1", vec![1.0, 0.0, 0.0])])
            .unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
        assert!(index.is_empty().unwrap());

        assert!(matches!(index.search(&[1.0], 3, None), Err(Error::Retrieval(_))));
    }
}
