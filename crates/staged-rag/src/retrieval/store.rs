//! Knowledge base store: the SQLite registry plus one vector index per knowledge base
//!
//! Layout under the data directory:
//! - `registry.db` holds documents, chunk text and embeddings
//! - `<kb>.vectors.db` holds the HNSW index, rebuilt from the registry on open

use dashmap::DashMap;
use std::path::{Path, PathBuf};

use super::index::ChunkIndex;
use super::registry::DocumentRegistry;
use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::providers::RetrievedChunk;
use crate::types::{Document, DocumentSummary, StoredChunk};

/// Per-knowledge-base document storage with vector search
pub struct KnowledgeBaseStore {
    registry: DocumentRegistry,
    indexes: DashMap<String, ChunkIndex>,
}

impl KnowledgeBaseStore {
    /// Open the store under `config.data_dir`, indexing every stored chunk
    pub fn open(config: &StorageConfig, dimensions: usize) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let registry = DocumentRegistry::open(config.data_dir.join("registry.db"))?;

        let indexes = DashMap::new();
        for name in &config.knowledge_bases {
            let index = ChunkIndex::create(&index_path(&config.data_dir, name), dimensions, config)?;
            let chunks = registry.chunks(name)?;
            index.insert(&chunks)?;

            tracing::info!(
                "Loaded knowledge base '{}' ({} documents, {} chunks)",
                name,
                registry.list_documents(name)?.len(),
                chunks.len()
            );
            indexes.insert(name.clone(), index);
        }

        Ok(Self { registry, indexes })
    }

    pub fn contains(&self, kb: &str) -> bool {
        self.indexes.contains_key(kb)
    }

    /// Names of the configured knowledge bases, sorted
    pub fn knowledge_bases(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indexes.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of stored chunks in a knowledge base
    pub fn chunk_count(&self, kb: &str) -> Result<usize> {
        self.check(kb)?;
        self.registry.chunk_count(kb)
    }

    /// Find a document with identical content
    pub fn find_by_hash(&self, kb: &str, content_hash: &str) -> Result<Option<Document>> {
        self.check(kb)?;
        self.registry.find_by_hash(kb, content_hash)
    }

    /// Add a document and its chunks
    ///
    /// The registry rows and index entries land together: if either side
    /// fails, nothing of the document remains.
    pub fn insert(&self, kb: &str, document: Document, chunks: Vec<StoredChunk>) -> Result<()> {
        let index = self
            .indexes
            .get(kb)
            .ok_or_else(|| Error::KnowledgeBaseNotFound(kb.to_string()))?;

        let mut indexed = false;
        let result = self.registry.insert_document(&document, &chunks, || {
            index.insert(&chunks)?;
            indexed = true;
            Ok(())
        });

        if let Err(e) = result {
            if indexed {
                index.remove(chunks.iter().map(|c| c.id.as_str()));
            }
            tracing::warn!("Discarded document '{}' in '{}': {}", document.source, kb, e);
            return Err(e);
        }
        Ok(())
    }

    /// Document metadata for a knowledge base, in ingestion order
    pub fn list_documents(&self, kb: &str) -> Result<Vec<DocumentSummary>> {
        self.check(kb)?;
        self.registry.list_documents(kb)
    }

    pub fn get_document(&self, kb: &str, document_id: &str) -> Result<Document> {
        self.check(kb)?;
        self.registry
            .get_document(kb, document_id)?
            .ok_or_else(|| Error::DocumentNotFound(document_id.to_string()))
    }

    /// Nearest chunks to `query`, best first
    pub fn search(
        &self,
        kb: &str,
        query: &[f32],
        document_id: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let index = self
            .indexes
            .get(kb)
            .ok_or_else(|| Error::KnowledgeBaseNotFound(kb.to_string()))?;

        if let Some(id) = document_id {
            if !self.registry.contains_document(kb, id)? {
                return Err(Error::DocumentNotFound(id.to_string()));
            }
        }

        let hits = index.search(query, top_k, document_id)?;
        let ids: Vec<String> = hits.iter().map(|h| h.chunk_id.clone()).collect();
        let resolved = self.registry.resolve_chunks(kb, &ids)?;

        let results = resolved
            .into_iter()
            .zip(hits)
            .filter_map(|(row, hit)| {
                let (text, source) = row?;
                Some(RetrievedChunk {
                    text,
                    source,
                    similarity: hit.similarity,
                })
            })
            .collect();

        Ok(results)
    }

    fn check(&self, kb: &str) -> Result<()> {
        if self.contains(kb) {
            Ok(())
        } else {
            Err(Error::KnowledgeBaseNotFound(kb.to_string()))
        }
    }
}

fn index_path(dir: &Path, kb: &str) -> PathBuf {
    dir.join(format!("{}.vectors.db", kb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> KnowledgeBaseStore {
        let config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            knowledge_bases: vec!["recipes".to_string(), "resumes".to_string()],
            ..Default::default()
        };
        KnowledgeBaseStore::open(&config, 2).unwrap()
    }

    fn document_with_chunks(kb: &str, source: &str, vectors: &[[f32; 2]]) -> (Document, Vec<StoredChunk>) {
        let mut doc = Document::new(kb, source, "text/plain", "body", format!("hash-{}", source));
        doc.total_chunks = vectors.len() as u32;
        let chunks = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| StoredChunk {
                id: format!("{}-{}", source, i),
                document_id: doc.id.clone(),
                chunk_index: i as u32,
                content: format!("{} chunk {}", source, i),
                embedding: v.to_vec(),
            })
            .collect();
        (doc, chunks)
    }

    #[test]
    fn test_search_ranks_and_limits() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let (doc, chunks) = document_with_chunks("recipes", "oats.md", &[[0.0, 1.0], [1.0, 0.0], [0.7, 0.7]]);
        store.insert("recipes", doc, chunks).unwrap();

        let results = store.search("recipes", &[1.0, 0.0], None, 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source.chunk_index, 1);
        assert_eq!(results[1].source.chunk_index, 2);
        assert_eq!(results[0].source.source, "oats.md");
        assert_eq!(results[0].text, "oats.md chunk 1");
    }

    #[test]
    fn test_search_filters_by_document() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let (oats, oat_chunks) = document_with_chunks("recipes", "oats.md", &[[1.0, 0.0]]);
        let (soup, soup_chunks) = document_with_chunks("recipes", "soup.md", &[[1.0, 0.1]]);
        let soup_id = soup.id.clone();
        store.insert("recipes", oats, oat_chunks).unwrap();
        store.insert("recipes", soup, soup_chunks).unwrap();

        let results = store.search("recipes", &[1.0, 0.0], Some(&soup_id), 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source.document_id, soup_id);

        assert!(matches!(
            store.search("recipes", &[1.0, 0.0], Some("nope"), 5),
            Err(Error::DocumentNotFound(_))
        ));
    }

    #[test]
    fn test_unknown_kb() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        assert!(matches!(
            store.search("poetry", &[1.0, 0.0], None, 5),
            Err(Error::KnowledgeBaseNotFound(_))
        ));
        assert!(store.list_documents("poetry").is_err());
        assert!(store.chunk_count("poetry").is_err());
    }

    #[test]
    fn test_empty_kb_search_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        assert!(store.search("resumes", &[1.0, 0.0], None, 5).unwrap().is_empty());
    }

    #[test]
    fn test_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let doc_id = {
            let store = open(&dir);
            let (doc, chunks) = document_with_chunks("recipes", "oats.md", &[[1.0, 0.0], [0.0, 1.0]]);
            let id = doc.id.clone();
            store.insert("recipes", doc, chunks).unwrap();
            id
        };
        assert!(dir.path().join("registry.db").exists());

        let reopened = open(&dir);
        assert_eq!(reopened.chunk_count("recipes").unwrap(), 2);
        assert_eq!(reopened.get_document("recipes", &doc_id).unwrap().source, "oats.md");
        assert_eq!(reopened.list_documents("recipes").unwrap().len(), 1);
        assert!(reopened.find_by_hash("recipes", "hash-oats.md").unwrap().is_some());

        let results = reopened.search("recipes", &[0.0, 1.0], None, 1).unwrap();
        assert_eq!(results[0].source.chunk_index, 1);
    }

    #[test]
    fn test_failed_insert_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        // Two chunks sharing one ID cannot both be stored
        let (doc, mut chunks) = document_with_chunks("recipes", "oats.md", &[[1.0, 0.0], [0.0, 1.0]]);
        chunks[1].id = chunks[0].id.clone();
        assert!(store.insert("recipes", doc, chunks).is_err());

        assert_eq!(store.chunk_count("recipes").unwrap(), 0);
        assert!(store.find_by_hash("recipes", "hash-oats.md").unwrap().is_none());
        assert!(store.list_documents("recipes").unwrap().is_empty());
        assert!(store.search("recipes", &[1.0, 0.0], None, 5).unwrap().is_empty());

        // The same content goes in cleanly on a second attempt
        let (doc, chunks) = document_with_chunks("recipes", "oats.md", &[[1.0, 0.0], [0.0, 1.0]]);
        store.insert("recipes", doc, chunks).unwrap();
        assert_eq!(store.chunk_count("recipes").unwrap(), 2);
        assert_eq!(store.search("recipes", &[1.0, 0.0], None, 5).unwrap().len(), 2);
    }

    #[test]
    fn test_wrong_dimension_embedding_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let (doc, mut chunks) = document_with_chunks("recipes", "oats.md", &[[1.0, 0.0], [0.0, 1.0]]);
        chunks[1].embedding = vec![0.0, 1.0, 0.5];
        let err = store.insert("recipes", doc, chunks).unwrap_err();

        assert!(matches!(err, Error::Embedding(_)));
        assert_eq!(store.chunk_count("recipes").unwrap(), 0);
        assert!(store.find_by_hash("recipes", "hash-oats.md").unwrap().is_none());
    }
}
