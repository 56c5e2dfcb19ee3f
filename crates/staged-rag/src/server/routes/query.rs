//! Streaming query endpoints

use axum::{extract::State, response::IntoResponse, Json};

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::sse::sse_response;
use crate::types::{QueryRequest, RewriteRequest};

/// POST /query - Run the stage pipeline and stream its progress
///
/// Unknown knowledge bases are reported on the stream, like any other
/// retrieval failure.
pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse> {
    request.validate()?;
    tracing::info!("Query on '{}': \"{}\"", request.kb, request.prompt);

    Ok(sse_response(state.runner().spawn(request)))
}

/// POST /query/supplement/rewrite - Rewrite a product description in a tone
pub async fn rewrite_supplement(
    State(state): State<AppState>,
    Json(request): Json<RewriteRequest>,
) -> Result<impl IntoResponse> {
    if request.doc_id.trim().is_empty() {
        return Err(Error::InvalidRequest("doc_id must not be empty".to_string()));
    }
    tracing::info!("Rewrite of {} in a {} tone", request.doc_id, request.tone);

    let query = request.into_query();
    query.validate()?;
    Ok(sse_response(state.runner().spawn(query)))
}
