//! Ingestion pipeline orchestration

use reqwest::header::CONTENT_TYPE;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::providers::Embedder;
use crate::retrieval::KnowledgeBaseStore;
use crate::types::{Document, IngestDocument, IngestSummary, StoredChunk};

use super::chunker::TextChunker;
use super::extract::{self, resolve_content_type};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Extracts, chunks, embeds, and stores documents
pub struct IngestPipeline {
    store: Arc<KnowledgeBaseStore>,
    embedder: Arc<dyn Embedder>,
    chunker: TextChunker,
    http: reqwest::Client,
}

impl IngestPipeline {
    /// Create a new ingestion pipeline
    pub fn new(
        store: Arc<KnowledgeBaseStore>,
        embedder: Arc<dyn Embedder>,
        chunking: &ChunkingConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            chunker: TextChunker::from_config(chunking),
            http: reqwest::Client::new(),
        }
    }

    /// Ingest a document whose text is already extracted
    ///
    /// Content already present in the knowledge base (same SHA-256) is not
    /// stored twice; the existing document is returned with `duplicate` set.
    pub async fn ingest(&self, kb: &str, upload: IngestDocument) -> Result<IngestSummary> {
        let start = Instant::now();
        self.check_kb(kb)?;

        let content_type = resolve_content_type(&upload.filename, upload.content_type.as_deref());
        if !content_type.starts_with("text/") {
            return Err(Error::UnsupportedContentType(content_type));
        }

        self.store_text(kb, upload, content_type, start).await
    }

    /// Ingest an uploaded file, extracting its text first
    pub async fn ingest_bytes(
        &self,
        kb: &str,
        filename: String,
        declared_type: Option<String>,
        bytes: Vec<u8>,
        title: Option<String>,
    ) -> Result<IngestSummary> {
        let start = Instant::now();
        self.check_kb(kb)?;

        // The PDF extractor can panic on malformed fonts; the blocking task contains it
        let name = filename.clone();
        let extracted = tokio::task::spawn_blocking(move || {
            extract::extract(&name, declared_type.as_deref(), &bytes)
        })
        .await
        .map_err(|e| {
            if e.is_panic() {
                Error::file_parse(&filename, "text extraction crashed")
            } else {
                Error::Internal(format!("Task join error: {}", e))
            }
        })??;

        let content_type = extracted.content_type;
        let upload = IngestDocument {
            filename,
            content: extracted.content,
            content_type: Some(content_type.clone()),
            title: title.or(extracted.title),
            pages: extracted.pages,
        };
        self.store_text(kb, upload, content_type, start).await
    }

    /// Fetch a page or file over HTTP(S) and ingest it
    pub async fn ingest_url(&self, kb: &str, url: &str, title: Option<String>) -> Result<IngestSummary> {
        self.check_kb(kb)?;

        let parsed = reqwest::Url::parse(url)
            .map_err(|e| Error::InvalidRequest(format!("Invalid URL {}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidRequest(format!(
                "Only http and https URLs can be ingested, got {}",
                parsed.scheme()
            )));
        }

        tracing::info!("Fetching {} for '{}'", parsed, kb);
        let response = self
            .http
            .get(parsed.clone())
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        let declared_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();

        self.ingest_bytes(kb, parsed.to_string(), declared_type, bytes, title)
            .await
    }

    fn check_kb(&self, kb: &str) -> Result<()> {
        if self.store.contains(kb) {
            Ok(())
        } else {
            Err(Error::KnowledgeBaseNotFound(kb.to_string()))
        }
    }

    async fn store_text(
        &self,
        kb: &str,
        upload: IngestDocument,
        content_type: String,
        start: Instant,
    ) -> Result<IngestSummary> {
        if upload.content.trim().is_empty() {
            return Err(Error::InvalidRequest(format!(
                "{} has no text content",
                upload.filename
            )));
        }

        let content_hash = hex::encode(Sha256::digest(upload.content.as_bytes()));
        if let Some(existing) = self.store.find_by_hash(kb, &content_hash)? {
            tracing::info!(
                "Skipping {}: identical content already stored as {}",
                upload.filename,
                existing.id
            );
            return Ok(IngestSummary {
                document: existing.summary(),
                chunks_created: 0,
                duplicate: true,
                processing_time_ms: start.elapsed().as_millis() as u64,
            });
        }

        let mut texts = self.chunker.chunk(&upload.content);
        if texts.is_empty() {
            // Short documents are kept whole
            texts.push(upload.content.trim().to_string());
        }

        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(Error::embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        let mut document = Document::new(kb, &upload.filename, content_type, upload.content, content_hash);
        if let Some(title) = upload.title.filter(|t| !t.trim().is_empty()) {
            document.title = title;
        }
        document.pages = upload.pages;
        document.total_chunks = texts.len() as u32;

        let chunks: Vec<StoredChunk> = texts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (content, embedding))| StoredChunk {
                id: Uuid::new_v4().to_string(),
                document_id: document.id.clone(),
                chunk_index: i as u32,
                content,
                embedding,
            })
            .collect();
        let chunks_created = chunks.len() as u32;
        let summary = document.summary();

        // SQLite and index writes block
        let store = self.store.clone();
        let kb_name = kb.to_string();
        tokio::task::spawn_blocking(move || store.insert(&kb_name, document, chunks))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

        let processing_time_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Ingested {} into '{}': {} chunks in {}ms",
            summary.source,
            kb,
            chunks_created,
            processing_time_ms
        );

        Ok(IngestSummary {
            document: summary,
            chunks_created,
            duplicate: false,
            processing_time_ms,
        })
    }
}
