//! Core types for the staged RAG service

pub mod document;
pub mod event;
pub mod query;

pub use document::{Document, DocumentSummary, IngestDocument, IngestSummary, StoredChunk};
pub use event::{Outcome, SourceRef, StreamEvent};
pub use query::{QueryRequest, RewriteRequest};
