//! Streaming relay.
//!
//! Two strategies forward an upstream chunked body to the client:
//!
//! - [`pass_through`] relays upstream bytes unchanged.
//! - [`reframe`] decodes upstream SSE with [`SseReframer`] and re-emits each text
//!   delta as `data: {"content": <delta>}\n\n`, always finishing with
//!   `data: [DONE]\n\n` unless the client went away.
//!
//! Both take a [`CancellationToken`]. It is checked before every upstream read and
//! is cancelled when the client body is dropped, so a disconnect stops upstream
//! consumption within one read cycle.

use std::io;

use async_stream::stream;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Raw upstream body.
pub type ByteStream = BoxStream<'static, Result<Bytes, io::Error>>;

/// Provider-specific extraction of the text delta from one parsed SSE payload.
pub type DeltaExtractor = fn(&Value) -> Option<String>;

/// Terminal SSE frame sent to the client.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Maximum bytes buffered while waiting for a newline.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Something decoded from the upstream event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Incremental text.
    Delta(String),
    /// The upstream reported an error inside the stream.
    Failed(String),
    /// `data: [DONE]` was received.
    Done,
}

/// Line-buffered SSE decoder.
///
/// Buffers raw bytes across chunk boundaries and only decodes complete lines, so
/// multi-byte characters split between reads are reassembled before UTF-8 decoding.
pub struct SseReframer {
    buffer: Vec<u8>,
    extractor: DeltaExtractor,
    finished: bool,
}

impl SseReframer {
    pub fn new(extractor: DeltaExtractor) -> Self {
        Self {
            buffer: Vec::new(),
            extractor,
            finished: false,
        }
    }

    /// Whether `[DONE]` or an in-band error has been seen. Later input is ignored.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Process a chunk of bytes from the upstream body.
    pub fn process_chunk(&mut self, bytes: &[u8]) -> Vec<RelayEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.process_line(&String::from_utf8_lossy(&line), &mut events);
            if self.finished {
                self.buffer.clear();
                return events;
            }
        }

        if self.buffer.len() > MAX_LINE_BYTES {
            tracing::warn!(
                buffered = self.buffer.len(),
                "SSE line exceeded buffer cap, discarding"
            );
            self.buffer.clear();
        }

        events
    }

    /// Flush a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Vec<RelayEvent> {
        let mut events = Vec::new();
        if !self.finished && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.process_line(&String::from_utf8_lossy(&line), &mut events);
        }
        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<RelayEvent>) {
        let line = line.trim_end_matches(['\n', '\r']);

        // Blank separators, comments and non-data fields carry no content.
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.strip_prefix(' ').unwrap_or(data).trim_end();

        if data == "[DONE]" {
            self.finished = true;
            events.push(RelayEvent::Done);
            return;
        }

        let parsed: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unparsable SSE line");
                return;
            }
        };

        if let Some(err) = parsed.get("error").filter(|e| !e.is_null()) {
            self.finished = true;
            events.push(RelayEvent::Failed(upstream_error_message(err)));
            return;
        }

        if let Some(delta) = (self.extractor)(&parsed).filter(|d| !d.is_empty()) {
            events.push(RelayEvent::Delta(delta));
        }
    }
}

/// Best-effort human readable message from an upstream `error` value.
pub fn upstream_error_message(err: &Value) -> String {
    err.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| err.as_str().map(str::to_string))
        .unwrap_or_else(|| err.to_string())
}

/// `data: {"content": <delta>}\n\n`
pub fn content_frame(delta: &str) -> Bytes {
    let payload = serde_json::json!({ "content": delta });
    Bytes::from(format!("data: {}\n\n", payload))
}

/// Inline error event shown to the client after streaming has begun.
pub fn error_frame(message: &str) -> Bytes {
    content_frame(&format!("[ERROR] {}", message))
}

/// Single-fire guard for the terminal write.
#[derive(Debug, Default)]
pub struct TerminalLatch {
    fired: bool,
}

impl TerminalLatch {
    /// Returns `true` exactly once.
    pub fn try_fire(&mut self) -> bool {
        !std::mem::replace(&mut self.fired, true)
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

/// How the read loop ended.
enum Exit {
    Completed,
    Failed(String),
    Cancelled,
}

/// Re-framed relay: decode upstream SSE and emit normalized content events.
pub fn reframe(
    mut upstream: ByteStream,
    extractor: DeltaExtractor,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
    stream! {
        let _disconnect = cancel.clone().drop_guard();
        let mut reframer = SseReframer::new(extractor);
        let mut latch = TerminalLatch::default();

        let exit = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                chunk = upstream.next() => Some(chunk),
            };

            let events = match next {
                None => break Exit::Cancelled,
                Some(Some(Ok(bytes))) => reframer.process_chunk(&bytes),
                Some(Some(Err(e))) => {
                    tracing::error!(error = %e, "Upstream stream failed");
                    break Exit::Failed(e.to_string());
                }
                Some(None) => {
                    let events = reframer.finish();
                    let mut failure = None;
                    for event in events {
                        match event {
                            RelayEvent::Delta(delta) => yield Ok(content_frame(&delta)),
                            RelayEvent::Failed(message) => failure = Some(message),
                            RelayEvent::Done => {}
                        }
                    }
                    break failure.map_or(Exit::Completed, Exit::Failed);
                }
            };

            let mut failure = None;
            for event in events {
                match event {
                    RelayEvent::Delta(delta) => yield Ok(content_frame(&delta)),
                    RelayEvent::Failed(message) => failure = Some(message),
                    RelayEvent::Done => {}
                }
            }
            if let Some(message) = failure {
                break Exit::Failed(message);
            }
            if reframer.is_finished() {
                break Exit::Completed;
            }
        };

        match exit {
            Exit::Cancelled => {
                tracing::info!("Client disconnected, upstream read cancelled");
            }
            Exit::Failed(message) => {
                if latch.try_fire() {
                    yield Ok(error_frame(&message));
                    yield Ok(Bytes::from_static(DONE_FRAME.as_bytes()));
                }
            }
            Exit::Completed => {
                if latch.try_fire() {
                    yield Ok(Bytes::from_static(DONE_FRAME.as_bytes()));
                }
            }
        }
    }
}

/// Pass-through relay: forward upstream bytes unchanged.
///
/// An upstream error is forwarded as a body error, which aborts the client response.
pub fn pass_through(
    mut upstream: ByteStream,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
    stream! {
        let _disconnect = cancel.clone().drop_guard();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Client disconnected, upstream read cancelled");
                    break;
                }
                chunk = upstream.next() => chunk,
            };

            match next {
                Some(Ok(bytes)) => yield Ok(bytes),
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Upstream stream failed");
                    yield Err(e);
                    break;
                }
                None => break,
            }
        }
    }
}

/// A complete reply rendered as a re-framed event stream.
pub fn single_reply(text: String) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
    let mut frames = Vec::with_capacity(2);
    if !text.is_empty() {
        frames.push(Ok(content_frame(&text)));
    }
    frames.push(Ok(Bytes::from_static(DONE_FRAME.as_bytes())));
    futures::stream::iter(frames)
}

/// Extract `choices[0].delta.content` (OpenAI-compatible chunks).
pub fn openai_delta(value: &Value) -> Option<String> {
    value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Extract `candidates[0].content.parts[0].text` (Gemini chunks).
pub fn gemini_delta(value: &Value) -> Option<String> {
    value
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(str::to_string)
}
