//! Document and chunk types with source tracking

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A document that has been ingested into a knowledge base
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID (UUID v4, never reused)
    pub id: String,
    /// Knowledge base the document belongs to
    pub kb: String,
    /// Display title
    pub title: String,
    /// Source name (filename or URL)
    pub source: String,
    /// MIME type
    pub content_type: String,
    /// Page count, when the source has pages
    pub pages: Option<u32>,
    /// Full extracted text
    pub content: String,
    /// Content hash for deduplication
    pub content_hash: String,
    /// Total number of chunks created
    pub total_chunks: u32,
    /// Ingestion timestamp
    pub ingested_at: chrono::DateTime<chrono::Utc>,
}

impl Document {
    /// Create a new document with a fresh ID
    pub fn new(
        kb: impl Into<String>,
        source: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<String>,
        content_hash: impl Into<String>,
    ) -> Self {
        let source = source.into();
        Self {
            id: Uuid::new_v4().to_string(),
            kb: kb.into(),
            title: source.clone(),
            source,
            content_type: content_type.into(),
            pages: None,
            content: content.into(),
            content_hash: content_hash.into(),
            total_chunks: 0,
            ingested_at: chrono::Utc::now(),
        }
    }

    /// Listing view without the document body
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            source: self.source.clone(),
            content_type: self.content_type.clone(),
            pages: self.pages,
            total_chunks: self.total_chunks,
            ingested_at: self.ingested_at,
        }
    }
}

/// A chunk with its embedding, as held by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Unique chunk ID
    pub id: String,
    /// Parent document ID
    pub document_id: String,
    /// Position in the document's chunk sequence
    pub chunk_index: u32,
    /// Chunk text
    pub content: String,
    /// Embedding vector
    pub embedding: Vec<f32>,
}

/// Document metadata returned by listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub source: String,
    pub content_type: String,
    pub pages: Option<u32>,
    pub total_chunks: u32,
    pub ingested_at: chrono::DateTime<chrono::Utc>,
}

/// Text document submitted for ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestDocument {
    /// Original filename or URL
    pub filename: String,
    /// Extracted text content
    pub content: String,
    /// MIME type (guessed from the filename when absent)
    #[serde(default)]
    pub content_type: Option<String>,
    /// Display title (defaults to the filename)
    #[serde(default)]
    pub title: Option<String>,
    /// Page count of the original
    #[serde(default)]
    pub pages: Option<u32>,
}

/// Result of an ingestion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSummary {
    /// Stored (or already-present) document
    pub document: DocumentSummary,
    /// Chunks created by this request (0 for duplicates)
    pub chunks_created: u32,
    /// True when identical content was already in the knowledge base
    pub duplicate: bool,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}
