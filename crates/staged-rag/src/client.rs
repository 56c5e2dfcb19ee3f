//! HTTP client for the query endpoints
//!
//! Reads the event stream until the first terminal event and hands progress
//! labels to a callback as they arrive.

use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::sse::SseDecoder;
use crate::types::{Outcome, QueryRequest, RewriteRequest, StreamEvent};

/// Client for a running staged-rag server
pub struct QueryClient {
    client: Client,
    base_url: String,
}

impl QueryClient {
    /// Create a client for the server at `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Run a query, calling `on_progress` for each stage label
    pub async fn query<F>(&self, request: &QueryRequest, on_progress: F) -> Result<Outcome>
    where
        F: FnMut(&str),
    {
        self.stream("/query", request, on_progress).await
    }

    /// Rewrite a supplement product description
    pub async fn rewrite<F>(&self, request: &RewriteRequest, on_progress: F) -> Result<Outcome>
    where
        F: FnMut(&str),
    {
        self.stream("/query/supplement/rewrite", request, on_progress).await
    }

    async fn stream<B, F>(&self, path: &str, body: &B, mut on_progress: F) -> Result<Outcome>
    where
        B: Serialize + ?Sized,
        F: FnMut(&str),
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(body);
            return Err(Error::InvalidRequest(format!("HTTP {}: {}", status, message)));
        }

        let mut decoder = SseDecoder::new();
        let mut bytes = response.bytes_stream();

        while let Some(chunk) = bytes.next().await {
            for payload in decoder.push(&chunk?) {
                match StreamEvent::from_payload(&payload) {
                    StreamEvent::Progress(label) => on_progress(&label),
                    StreamEvent::Done(outcome) => return Ok(outcome),
                }
            }
        }

        if let Some(payload) = decoder.finish() {
            if let StreamEvent::Done(outcome) = StreamEvent::from_payload(&payload) {
                return Ok(outcome);
            }
        }
        Err(Error::Internal(
            "Event stream ended without a result".to_string(),
        ))
    }
}
