//! Events published by the stage pipeline
//!
//! A request produces zero or more progress labels followed by exactly one
//! terminal [`Outcome`]. On the wire a progress event is the bare label and a
//! terminal event is a JSON object tagged by `status`.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Identifies the chunk an answer drew on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Document ID assigned at ingestion
    pub document_id: String,
    /// Source name (filename or URL)
    pub source: String,
    /// MIME type of the source document
    pub content_type: String,
    /// Offset within the document's chunk sequence
    pub chunk_index: u32,
    /// Document title
    pub title: String,
    /// Page count, when the source has pages
    #[serde(default)]
    pub pages: Option<u32>,
}

/// Terminal result of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    /// Pipeline finished with an answer
    Complete {
        answer: String,
        sources: Vec<SourceRef>,
    },
    /// Pipeline stopped on an unrecoverable failure
    Error { message: String },
}

impl Outcome {
    /// Build an error outcome
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }
}

/// One event on a request's stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Human-readable label of the stage about to run
    Progress(String),
    /// Final event; nothing follows it
    Done(Outcome),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// Wire payload carried in the `data:` field
    pub fn payload(&self) -> Result<String> {
        match self {
            Self::Progress(label) => Ok(label.clone()),
            Self::Done(outcome) => Ok(serde_json::to_string(outcome)?),
        }
    }

    /// Classify a received payload: a JSON object with a known `status` is
    /// terminal, anything else is a progress label.
    pub fn from_payload(payload: &str) -> Self {
        if payload.trim_start().starts_with('{') {
            if let Ok(outcome) = serde_json::from_str::<Outcome>(payload) {
                return Self::Done(outcome);
            }
        }
        Self::Progress(payload.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oatmeal_source(index: u32) -> SourceRef {
        SourceRef {
            document_id: "3f0c9a52-8d7e-4c55-9a59-1c2f5e0b7d11".to_string(),
            source: "oatmeal.md".to_string(),
            content_type: "text/markdown".to_string(),
            chunk_index: index,
            title: "Overnight Oats".to_string(),
            pages: None,
        }
    }

    #[test]
    fn test_complete_payload_round_trip() {
        let outcome = Outcome::Complete {
            answer: "Line one\nLine \"two\" with unicode: café".to_string(),
            sources: vec![oatmeal_source(0), SourceRef { pages: Some(3), ..oatmeal_source(4) }],
        };
        let event = StreamEvent::Done(outcome.clone());

        let payload = event.payload().unwrap();
        assert!(!payload.contains('\n'));
        assert_eq!(StreamEvent::from_payload(&payload), StreamEvent::Done(outcome));
    }

    #[test]
    fn test_wire_field_names() {
        let payload = StreamEvent::Done(Outcome::Complete {
            answer: "ok".to_string(),
            sources: vec![oatmeal_source(2)],
        })
        .payload()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(value["status"], "complete");
        assert_eq!(value["answer"], "ok");
        let source = &value["sources"][0];
        for field in ["document_id", "source", "content_type", "chunk_index", "title", "pages"] {
            assert!(source.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(source["chunk_index"], 2);
    }

    #[test]
    fn test_error_payload() {
        let payload = StreamEvent::Done(Outcome::error("LLM error: quota"))
            .payload()
            .unwrap();
        assert_eq!(payload, r#"{"status":"error","message":"LLM error: quota"}"#);
    }

    #[test]
    fn test_progress_is_bare_label() {
        let event = StreamEvent::Progress("Retrieving relevant information...".to_string());
        assert_eq!(event.payload().unwrap(), "Retrieving relevant information...");
        assert!(!event.is_terminal());
        assert_eq!(StreamEvent::from_payload("Refining response..."), StreamEvent::Progress("Refining response...".to_string()));
    }

    #[test]
    fn test_json_without_status_is_progress() {
        let event = StreamEvent::from_payload(r#"{"answer":"x"}"#);
        assert!(matches!(event, StreamEvent::Progress(_)));
    }
}
