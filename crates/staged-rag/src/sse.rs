//! Server-Sent Events framing for pipeline event streams
//!
//! Every event travels as `data: <payload>` lines followed by a blank line.
//! Payloads with newlines span several `data:` lines; comment lines (used
//! for keep-alives) carry no event.

use axum::http::{header, HeaderName};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures_util::StreamExt;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::types::StreamEvent;

/// Convert a pipeline event into an SSE event
pub fn to_sse_event(event: &StreamEvent) -> Event {
    let payload = event.payload().unwrap_or_else(|e| {
        tracing::error!("Failed to encode terminal event: {}", e);
        serde_json::json!({"status": "error", "message": e.to_string()}).to_string()
    });
    // axum splits on '\n' and rejects bare carriage returns
    let payload = payload.replace("\r\n", "\n").replace('\r', "\n");
    Event::default().data(payload)
}

/// Stream a run's events to the client as `text/event-stream`
pub fn sse_response(rx: mpsc::Receiver<StreamEvent>) -> impl IntoResponse {
    let stream = ReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(to_sse_event(&event)));

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
}

/// Incremental decoder for an SSE byte stream, yielding event payloads
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed received bytes and return the payloads of all completed events
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));

        let mut payloads = Vec::new();
        while let Some(end) = find_blank_line(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(payload) = parse_block(&String::from_utf8_lossy(&block[..end])) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Payload of a trailing event the stream ended without terminating
    pub fn finish(&mut self) -> Option<String> {
        let block = std::mem::take(&mut self.buffer);
        parse_block(&String::from_utf8_lossy(&block))
    }
}

fn find_blank_line(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_block(block: &str) -> Option<String> {
    let mut data: Option<String> = None;
    for line in block.lines() {
        let Some(value) = line.strip_prefix("data:") else {
            // Comments and other fields are ignored
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match data.as_mut() {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(value);
            }
            None => data = Some(value.to_string()),
        }
    }
    data
}
