//! Document ingestion endpoints

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{IngestDocument, IngestSummary};

/// POST /ingest/:kb - Chunk, embed, and store a text document
pub async fn ingest_document(
    State(state): State<AppState>,
    Path(kb): Path<String>,
    Json(upload): Json<IngestDocument>,
) -> Result<Json<IngestSummary>> {
    tracing::info!(
        "Ingesting {} into '{}' ({} bytes)",
        upload.filename,
        kb,
        upload.content.len()
    );

    let summary = state.ingest().ingest(&kb, upload).await?;
    Ok(Json(summary))
}

/// POST /ingest/:kb/file - Upload a file (PDF, HTML, or text) as multipart form data
///
/// Fields: `file` (required) and `title` (optional).
pub async fn ingest_file(
    State(state): State<AppState>,
    Path(kb): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<IngestSummary>> {
    let mut file = None;
    let mut title = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidRequest(format!("Failed to read multipart field: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| Error::InvalidRequest(format!("Failed to read {}: {}", filename, e)))?;
                file = Some((filename, content_type, data.to_vec()));
            }
            "title" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| Error::InvalidRequest(format!("Failed to read title: {}", e)))?;
                title = Some(text).filter(|t| !t.trim().is_empty());
            }
            other => tracing::debug!("Ignoring multipart field '{}'", other),
        }
    }

    let (filename, content_type, data) =
        file.ok_or_else(|| Error::InvalidRequest("Missing multipart field 'file'".to_string()))?;

    tracing::info!("Ingesting file {} into '{}' ({} bytes)", filename, kb, data.len());

    let summary = state
        .ingest()
        .ingest_bytes(&kb, filename, content_type, data, title)
        .await?;
    Ok(Json(summary))
}

/// Body of POST /ingest/:kb/url
#[derive(Debug, Deserialize)]
pub struct IngestUrl {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// POST /ingest/:kb/url - Fetch a web page or file and ingest it
pub async fn ingest_url(
    State(state): State<AppState>,
    Path(kb): Path<String>,
    Json(request): Json<IngestUrl>,
) -> Result<Json<IngestSummary>> {
    let summary = state
        .ingest()
        .ingest_url(&kb, &request.url, request.title)
        .await?;
    Ok(Json(summary))
}
