//! Streaming relay.
//!
//! Turns an upstream OpenAI-compatible SSE body into [`StreamEvent`]s.
//! [`SseDecoder`] buffers raw bytes across chunk boundaries and reassembles
//! complete `data:` lines; [`relay_chunks`] drives the body and guarantees
//! that a stream ends with exactly one `Done` or one `Error` event.

use std::convert::Infallible;

use async_stream::stream;
use axum::response::sse::Event;
use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::types::{ChatCompletionChunk, ChatMessage};
use crate::error::{ErrorBody, ErrorDetail, UpstreamError};
use crate::provider::ProviderClient;

/// Maximum bytes buffered for one line before it is discarded.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// One event relayed to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental text from the model.
    Token { text: String },
    /// Terminal failure. Nothing follows it.
    Error(ErrorDetail),
    /// Graceful end of the completion.
    Done,
}

impl StreamEvent {
    pub fn token(text: impl Into<String>) -> Self {
        StreamEvent::Token { text: text.into() }
    }

    /// JSON payload carried in the event's `data:` line.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            StreamEvent::Token { text } => serde_json::json!({ "content": text }),
            StreamEvent::Error(detail) => {
                serde_json::to_value(ErrorBody::from(detail.clone())).unwrap_or_default()
            }
            StreamEvent::Done => serde_json::json!({ "done": true }),
        }
    }

    /// Frame as an SSE event: `data: <json>\n\n`.
    pub fn to_sse(&self) -> Result<Event, Infallible> {
        Ok(Event::default().data(self.payload().to_string()))
    }
}

impl From<&UpstreamError> for StreamEvent {
    fn from(err: &UpstreamError) -> Self {
        StreamEvent::Error(err.to_detail())
    }
}

/// A unit decoded from the upstream body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Frame {
    Delta(String),
    Done,
    Error(UpstreamError),
}

/// Line-buffered decoder for OpenAI-compatible SSE bodies.
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
        }
    }

    /// Feed a chunk of the body, returning every frame it completes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            process_line(&line, &mut frames);
        }

        if self.buffer.len() > MAX_LINE_BYTES {
            tracing::warn!(
                buffered = self.buffer.len(),
                "SSE line exceeded buffer cap, discarding"
            );
            self.buffer.clear();
        }

        frames
    }

    /// Decode whatever is left once the body has ended.
    pub fn finish(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            process_line(&line, &mut frames);
        }
        frames
    }
}

fn process_line(raw: &[u8], frames: &mut Vec<Frame>) {
    let Ok(line) = std::str::from_utf8(raw) else {
        tracing::warn!("Skipping SSE line with invalid UTF-8");
        return;
    };
    let line = line.trim_end_matches(['\r', '\n']);

    // event:, id:, retry: and ": comment" lines carry nothing we relay
    let Some(data) = line.strip_prefix("data:") else {
        return;
    };
    let data = data.strip_prefix(' ').unwrap_or(data);
    process_data(data, frames);
}

fn process_data(data: &str, frames: &mut Vec<Frame>) {
    let data = data.trim();
    if data.is_empty() {
        return;
    }
    if data == "[DONE]" {
        frames.push(Frame::Done);
        return;
    }

    let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping malformed stream chunk");
            return;
        }
    };

    if let Some(error) = chunk.error.filter(|e| !e.is_null()) {
        frames.push(Frame::Error(in_band_error(&error)));
        return;
    }

    for choice in chunk.choices {
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            frames.push(Frame::Delta(text));
        }
    }
}

/// Map an in-stream `{"error": ...}` object to an upstream error.
fn in_band_error(error: &serde_json::Value) -> UpstreamError {
    let message = match error {
        serde_json::Value::String(s) => s.clone(),
        other => other
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    };
    // Only numeric HTTP-like codes are meaningful; providers also send slugs.
    let code = error
        .get("code")
        .and_then(|c| c.as_u64())
        .filter(|c| (400..=599).contains(c))
        .map(|c| c as u16);
    UpstreamError::Provider { message, code }
}

/// Relay an upstream body as events.
///
/// Tokens are yielded as soon as the line carrying them is complete, in
/// upstream order. The stream ends after the first `Done` or `Error`.
/// Dropping the returned stream drops `chunks`.
pub fn relay_chunks<S>(chunks: S) -> impl Stream<Item = StreamEvent> + Send + 'static
where
    S: Stream<Item = Result<Bytes, UpstreamError>> + Send + 'static,
{
    stream! {
        futures::pin_mut!(chunks);
        let mut decoder = SseDecoder::new();
        let mut tokens: u64 = 0;
        let mut body_ended = false;

        while !body_ended {
            let frames = match chunks.next().await {
                Some(Ok(bytes)) => decoder.push(&bytes),
                Some(Err(e)) => {
                    tracing::error!(error = %e, tokens, "Upstream stream failed");
                    yield StreamEvent::from(&e);
                    return;
                }
                None => {
                    body_ended = true;
                    decoder.finish()
                }
            };

            for frame in frames {
                match frame {
                    Frame::Delta(text) => {
                        tokens += 1;
                        yield StreamEvent::Token { text };
                    }
                    Frame::Done => {
                        tracing::debug!(tokens, "Upstream stream completed");
                        yield StreamEvent::Done;
                        return;
                    }
                    Frame::Error(e) => {
                        tracing::error!(error = %e, tokens, "Provider reported error mid-stream");
                        yield StreamEvent::from(&e);
                        return;
                    }
                }
            }
        }

        // Body ended without [DONE]
        tracing::debug!(tokens, "Upstream body ended without [DONE]");
        yield StreamEvent::Done;
    }
}

/// Stream a chat completion from `client`.
///
/// The upstream request is only sent once the returned stream is polled.
/// A failure to open it becomes the single `Error` event of the stream.
pub fn stream_chat(
    client: ProviderClient,
    upstream_model: String,
    messages: Vec<ChatMessage>,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    stream! {
        let chunks = match client.stream_completion(&upstream_model, &messages).await {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::error!(
                    upstream_model = %upstream_model,
                    error = %e,
                    "Failed to open upstream stream"
                );
                yield StreamEvent::from(&e);
                return;
            }
        };

        let events = relay_chunks(chunks);
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            yield event;
        }
    }
}
