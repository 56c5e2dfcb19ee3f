//! HTTP routes for the staged RAG server

pub mod documents;
pub mod ingest;
pub mod query;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::server::state::AppState;

/// Build all routes
pub fn routes(max_body_size: usize) -> Router<AppState> {
    Router::new()
        // Streaming queries
        .route("/query", post(query::query))
        .route("/query/supplement/rewrite", post(query::rewrite_supplement))
        // Ingestion, with a larger body limit for document uploads
        .route(
            "/ingest/:kb",
            post(ingest::ingest_document).layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route(
            "/ingest/:kb/file",
            post(ingest::ingest_file).layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route("/ingest/:kb/url", post(ingest::ingest_url))
        // Documents
        .route("/doc/:kb", get(documents::list_documents))
        .route("/doc/:kb/:doc_id", get(documents::get_document))
        // Health
        .route("/health", get(health_check))
        .route("/ready", get(readiness))
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "llm": {
            "provider": state.generator().name(),
            "model": state.generator().model(),
        },
        "knowledge_bases": state.store().knowledge_bases(),
    }))
}

/// Readiness check endpoint
async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
