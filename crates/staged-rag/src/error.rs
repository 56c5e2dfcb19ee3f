//! Error types for the staged RAG service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for staged-rag operations
pub type Result<T> = std::result::Result<T, Error>;

/// Service errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or empty request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Knowledge base name is not configured
    #[error("Knowledge base not found: {0}")]
    KnowledgeBaseNotFound(String),

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Content type that ingestion does not accept
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// File content could not be turned into text
    #[error("Failed to parse {filename}: {message}")]
    FileParse { filename: String, message: String },

    /// Retrieval/storage failure
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// Document registry error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Vector index error
    #[error("Vector index error: {0}")]
    VectorDb(String),

    /// Embedding error
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Upstream LLM error (quota, transport, malformed response)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Upstream refused the request; repeating it will not help
    #[error("Request rejected by {provider} ({status}): {message}")]
    Rejected {
        provider: String,
        status: u16,
        message: String,
    },

    /// Wall-clock budget exceeded
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a retrieval error
    pub fn retrieval(message: impl Into<String>) -> Self {
        Self::Retrieval(message.into())
    }

    /// Create a file parse error
    pub fn file_parse(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FileParse {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether a provider call that failed this way is worth repeating
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::Rejected { .. } | Error::Config(_))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Error::KnowledgeBaseNotFound(_) => (StatusCode::NOT_FOUND, "kb_not_found"),
            Error::DocumentNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::UnsupportedContentType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_type")
            }
            Error::FileParse { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "parse_error"),
            Error::Retrieval(_) => (StatusCode::INTERNAL_SERVER_ERROR, "retrieval_error"),
            Error::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            Error::VectorDb(_) => (StatusCode::INTERNAL_SERVER_ERROR, "vector_db_error"),
            Error::Embedding(_) => (StatusCode::INTERNAL_SERVER_ERROR, "embedding_error"),
            Error::Llm(_) => (StatusCode::SERVICE_UNAVAILABLE, "llm_error"),
            Error::Rejected { .. } => (StatusCode::BAD_GATEWAY, "upstream_rejected"),
            Error::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            Error::Json(_) => (StatusCode::BAD_REQUEST, "json_error"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "http_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
