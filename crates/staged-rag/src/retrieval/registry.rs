//! SQLite document registry: documents, chunk text, and chunk embeddings
//!
//! The registry is the durable record of every knowledge base. Vector
//! indexes are rebuilt from it when the store opens.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

use crate::error::Result;
use crate::types::{Document, DocumentSummary, SourceRef, StoredChunk};

/// SQLite-backed document and chunk registry
pub struct DocumentRegistry {
    conn: Mutex<Connection>,
}

impl DocumentRegistry {
    /// Create or open the registry at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let registry = Self {
            conn: Mutex::new(conn),
        };
        registry.migrate()?;
        Ok(registry)
    }

    /// Create an in-memory registry (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let registry = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        registry.migrate()?;
        Ok(registry)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
            "#,
        )?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                kb TEXT NOT NULL,
                title TEXT NOT NULL,
                source TEXT NOT NULL,
                content_type TEXT NOT NULL,
                pages INTEGER,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                total_chunks INTEGER NOT NULL,
                ingested_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_kb ON documents(kb);
            CREATE INDEX IF NOT EXISTS idx_documents_hash ON documents(kb, content_hash);

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                kb TEXT NOT NULL,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_kb ON chunks(kb);
            CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
            "#,
        )?;

        tracing::debug!("Document registry migrations complete");
        Ok(())
    }

    /// Write a document and its chunks in one transaction
    ///
    /// `index` runs after the rows are written and before the commit; if it
    /// fails, nothing is kept.
    pub fn insert_document<F>(&self, document: &Document, chunks: &[StoredChunk], index: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO documents (
                id, kb, title, source, content_type, pages,
                content, content_hash, total_chunks, ingested_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                document.id,
                document.kb,
                document.title,
                document.source,
                document.content_type,
                document.pages,
                document.content,
                document.content_hash,
                document.total_chunks,
                document.ingested_at,
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO chunks (id, kb, document_id, chunk_index, content, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for chunk in chunks {
                stmt.execute(params![
                    chunk.id,
                    document.kb,
                    chunk.document_id,
                    chunk.chunk_index,
                    chunk.content,
                    encode_embedding(&chunk.embedding),
                ])?;
            }
        }

        index()?;
        tx.commit()?;
        Ok(())
    }

    /// Number of chunks stored for a knowledge base
    pub fn chunk_count(&self, kb: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE kb = ?1",
            params![kb],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Document with the given content hash, if any
    pub fn find_by_hash(&self, kb: &str, content_hash: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let document = conn
            .query_row(
                "SELECT * FROM documents WHERE kb = ?1 AND content_hash = ?2 LIMIT 1",
                params![kb, content_hash],
                row_to_document,
            )
            .optional()?;
        Ok(document)
    }

    pub fn get_document(&self, kb: &str, document_id: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let document = conn
            .query_row(
                "SELECT * FROM documents WHERE kb = ?1 AND id = ?2",
                params![kb, document_id],
                row_to_document,
            )
            .optional()?;
        Ok(document)
    }

    pub fn contains_document(&self, kb: &str, document_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM documents WHERE kb = ?1 AND id = ?2",
                params![kb, document_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Document metadata for a knowledge base, in ingestion order
    pub fn list_documents(&self, kb: &str) -> Result<Vec<DocumentSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, title, source, content_type, pages, total_chunks, ingested_at
            FROM documents WHERE kb = ?1 ORDER BY rowid
            "#,
        )?;

        let documents = stmt
            .query_map(params![kb], |row| {
                Ok(DocumentSummary {
                    id: row.get("id")?,
                    title: row.get("title")?,
                    source: row.get("source")?,
                    content_type: row.get("content_type")?,
                    pages: row.get("pages")?,
                    total_chunks: row.get("total_chunks")?,
                    ingested_at: row.get("ingested_at")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(documents)
    }

    /// Every chunk of a knowledge base with its embedding, in ingestion order
    pub fn chunks(&self, kb: &str) -> Result<Vec<StoredChunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, document_id, chunk_index, content, embedding
            FROM chunks WHERE kb = ?1 ORDER BY rowid
            "#,
        )?;

        let chunks = stmt
            .query_map(params![kb], |row| {
                let embedding: Vec<u8> = row.get("embedding")?;
                Ok(StoredChunk {
                    id: row.get("id")?,
                    document_id: row.get("document_id")?,
                    chunk_index: row.get("chunk_index")?,
                    content: row.get("content")?,
                    embedding: decode_embedding(&embedding),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks)
    }

    /// Text and citation for each chunk ID, in the order given
    ///
    /// IDs that are not in the registry come back as `None`.
    pub fn resolve_chunks(&self, kb: &str, chunk_ids: &[String]) -> Result<Vec<Option<(String, SourceRef)>>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT c.content, c.chunk_index, d.id, d.source, d.content_type, d.title, d.pages
            FROM chunks c JOIN documents d ON d.id = c.document_id
            WHERE c.kb = ?1 AND c.id = ?2
            "#,
        )?;

        let mut resolved = Vec::with_capacity(chunk_ids.len());
        for id in chunk_ids {
            let row = stmt
                .query_row(params![kb, id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        SourceRef {
                            chunk_index: row.get(1)?,
                            document_id: row.get(2)?,
                            source: row.get(3)?,
                            content_type: row.get(4)?,
                            title: row.get(5)?,
                            pages: row.get(6)?,
                        },
                    ))
                })
                .optional()?;
            resolved.push(row);
        }
        Ok(resolved)
    }
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get("id")?,
        kb: row.get("kb")?,
        title: row.get("title")?,
        source: row.get("source")?,
        content_type: row.get("content_type")?,
        pages: row.get("pages")?,
        content: row.get("content")?,
        content_hash: row.get("content_hash")?,
        total_chunks: row.get("total_chunks")?,
        ingested_at: row.get("ingested_at")?,
    })
}

/// Little-endian f32 bytes
fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
