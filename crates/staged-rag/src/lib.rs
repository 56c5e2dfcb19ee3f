//! staged-rag: knowledge-base Q&A with a staged, progress-streaming pipeline
//!
//! Queries run through retrieve → analyze → draft → critique ⇄ refine against
//! a hosted LLM. Each stage announces itself on a Server-Sent Events stream
//! and the run ends with exactly one terminal result. Documents are chunked,
//! embedded, and stored per knowledge base.

pub mod client;
pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod pipeline;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod sse;
pub mod types;

pub use client::QueryClient;
pub use config::RagConfig;
pub use error::{Error, Result};
pub use pipeline::{PipelineState, Stage, StageRunner};
pub use types::{Outcome, QueryRequest, RewriteRequest, SourceRef, StreamEvent};
