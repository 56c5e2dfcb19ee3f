//! Document listing and retrieval endpoints

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::DocumentSummary;

/// GET /doc/:kb - List documents in a knowledge base
pub async fn list_documents(
    State(state): State<AppState>,
    Path(kb): Path<String>,
) -> Result<Json<Vec<DocumentSummary>>> {
    Ok(Json(state.store().list_documents(&kb)?))
}

/// GET /doc/:kb/:doc_id - Raw text of one document
pub async fn get_document(
    State(state): State<AppState>,
    Path((kb, doc_id)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let document = state.store().get_document(&kb, &doc_id)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        document.content,
    ))
}
