//! Event-stream framing for the chat relay
//!
//! One record on the wire is a `data: <json>` line followed by a blank line.
//! The relay encodes [`StreamEvent`]s into records; consumers feed raw body
//! fragments to an [`EventDecoder`], which reassembles records split across
//! fragment boundaries and skips anything it cannot decode.

use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use std::pin::Pin;

/// Prefix that marks a record line
pub const DATA_PREFIX: &str = "data: ";

/// One application-level event carried by the relay stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental fragment of the assistant reply (never empty)
    Chunk { content: String },
    /// Normal end of the reply
    Done,
    /// Upstream failure; ends the stream
    Error { message: String },
}

impl StreamEvent {
    pub fn chunk(content: impl Into<String>) -> Self {
        Self::Chunk {
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// `Done` and `Error` end a stream; nothing follows them
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }

    /// JSON payload of the record, without framing
    pub fn to_json(&self) -> String {
        match self {
            Self::Chunk { content } => json!({ "content": content }),
            Self::Done => json!({ "content": "", "done": true }),
            Self::Error { message } => json!({ "error": message }),
        }
        .to_string()
    }

    /// Fully framed record, ready to write to a response body
    pub fn to_record(&self) -> String {
        format!("{DATA_PREFIX}{}\n\n", self.to_json())
    }
}

/// Loose shape of a record payload. Fields are checked in priority order:
/// `error`, then `done`, then `content`.
#[derive(Debug, Deserialize)]
struct WireRecord {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

impl WireRecord {
    fn into_event(self) -> Option<StreamEvent> {
        if let Some(message) = self.error {
            return Some(StreamEvent::Error { message });
        }
        if self.done == Some(true) {
            return Some(StreamEvent::Done);
        }
        match self.content {
            Some(content) if !content.is_empty() => Some(StreamEvent::Chunk { content }),
            _ => None,
        }
    }
}

/// Decode a single line. Returns `None` for lines that are not records
/// (blank separators, `:` keep-alive comments) and for malformed payloads.
pub fn decode_record(line: &str) -> Option<StreamEvent> {
    let payload = line.strip_prefix(DATA_PREFIX)?;
    match serde_json::from_str::<WireRecord>(payload) {
        Ok(record) => record.into_event(),
        Err(e) => {
            tracing::trace!(error = %e, "Skipping undecodable record");
            None
        }
    }
}

// ============================================================================
// Line buffering
// ============================================================================

/// Byte-level carry-over buffer that yields complete lines.
///
/// Works on bytes rather than text so a multi-byte character split across two
/// fragments is reassembled before it is decoded.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete line with its `\n` (and any `\r`) removed
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.buf.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Bytes received after the last newline
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Incremental record decoder.
///
/// Once a terminal event has been produced the decoder is finished and
/// ignores any further input.
#[derive(Debug, Default)]
pub struct EventDecoder {
    lines: LineBuffer,
    finished: bool,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment off the wire, returning every event it completes
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        self.lines.push(bytes);
        while let Some(line) = self.lines.next_line() {
            if let Some(event) = decode_record(&line) {
                let terminal = event.is_terminal();
                events.push(event);
                if terminal {
                    self.finished = true;
                    break;
                }
            }
        }
        events
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    decoder: EventDecoder,
    ready: VecDeque<StreamEvent>,
    failed: bool,
}

/// Decode a byte stream lazily into events.
///
/// The returned stream ends right after the first terminal event, without
/// polling the body again. A transport error is passed through once and ends
/// the stream. A body that ends without a terminal event simply ends; callers
/// decide what that means.
pub fn decode_stream<S, B, E>(body: S) -> impl Stream<Item = Result<StreamEvent, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: EventDecoder::new(),
        ready: VecDeque::new(),
        failed: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((Ok(event), state));
            }
            if state.failed || state.decoder.is_finished() {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let events = state.decoder.feed(bytes.as_ref());
                    state.ready.extend(events);
                }
                Some(Err(e)) => {
                    state.failed = true;
                    return Some((Err(e), state));
                }
                None => return None,
            }
        }
    })
}
