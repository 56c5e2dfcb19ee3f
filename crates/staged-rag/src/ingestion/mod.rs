//! Document ingestion: text extraction, chunking, embedding, and storage

mod chunker;
mod extract;
mod processor;

pub use chunker::TextChunker;
pub use extract::{extract, ExtractedText};
pub use processor::IngestPipeline;
