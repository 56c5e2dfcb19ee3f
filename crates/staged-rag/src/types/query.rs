//! Query request types

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Knowledge base the rewrite variant always queries
pub const REWRITE_KB: &str = "supplements";

/// Query against one knowledge base, optionally scoped to a single document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Knowledge base name
    pub kb: String,
    /// Natural-language prompt
    pub prompt: String,
    /// Restrict retrieval to this document
    #[serde(default)]
    pub doc_id: Option<String>,
}

impl QueryRequest {
    /// Create a new query
    pub fn new(kb: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            kb: kb.into(),
            prompt: prompt.into(),
            doc_id: None,
        }
    }

    /// Scope retrieval to one document
    pub fn with_document(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }

    /// Reject empty fields before any stage runs
    pub fn validate(&self) -> Result<()> {
        if self.kb.trim().is_empty() {
            return Err(Error::InvalidRequest("kb must not be empty".to_string()));
        }
        if self.prompt.trim().is_empty() {
            return Err(Error::InvalidRequest("prompt must not be empty".to_string()));
        }
        if self.doc_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(Error::InvalidRequest("doc_id must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Rewrite a supplement product description in a given tone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteRequest {
    /// Product document to rewrite
    pub doc_id: String,
    /// Target tone (default: "balanced")
    #[serde(default = "default_tone")]
    pub tone: String,
}

fn default_tone() -> String {
    "balanced".to_string()
}

impl RewriteRequest {
    /// Build the document-scoped query the pipeline runs for this rewrite
    pub fn into_query(self) -> QueryRequest {
        let tone = if self.tone.trim().is_empty() {
            default_tone()
        } else {
            self.tone
        };
        QueryRequest {
            kb: REWRITE_KB.to_string(),
            prompt: format!(
                "Rewrite the product description in a {} tone. Make it persuasive but factual.",
                tone
            ),
            doc_id: Some(self.doc_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_id_is_optional() {
        let req: QueryRequest =
            serde_json::from_str(r#"{"kb":"recipes","prompt":"suggest a sandwich"}"#).unwrap();
        assert_eq!(req.doc_id, None);

        let req: QueryRequest =
            serde_json::from_str(r#"{"kb":"recipes","prompt":"x","doc_id":null}"#).unwrap();
        assert_eq!(req.doc_id, None);
    }

    #[test]
    fn test_validate_rejects_blank_prompt() {
        assert!(QueryRequest::new("recipes", "   ").validate().is_err());
        assert!(QueryRequest::new("", "hello").validate().is_err());
        assert!(QueryRequest::new("recipes", "hello").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_doc_id() {
        let req: QueryRequest =
            serde_json::from_str(r#"{"kb":"recipes","prompt":"x","doc_id":""}"#).unwrap();
        assert!(matches!(req.validate(), Err(Error::InvalidRequest(m)) if m.contains("doc_id")));

        assert!(QueryRequest::new("recipes", "x").with_document(" ").validate().is_err());
        assert!(QueryRequest::new("recipes", "x").with_document("abc").validate().is_ok());
    }

    #[test]
    fn test_rewrite_defaults_to_balanced() {
        let req: RewriteRequest = serde_json::from_str(r#"{"doc_id":"abc"}"#).unwrap();
        let query = req.into_query();

        assert_eq!(query.kb, REWRITE_KB);
        assert_eq!(query.doc_id.as_deref(), Some("abc"));
        assert!(query.prompt.contains("balanced tone"));
    }

    #[test]
    fn test_rewrite_uses_tone() {
        let query = RewriteRequest {
            doc_id: "abc".to_string(),
            tone: "scientific".to_string(),
        }
        .into_query();
        assert!(query.prompt.starts_with("Rewrite the product description in a scientific tone."));
    }
}
