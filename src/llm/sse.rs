//! Incremental parsing of provider event streams
//!
//! Both providers frame their streaming responses as `data:` lines. Each
//! provider supplies a parser for one payload; this module handles buffering,
//! ordering and termination.

use super::{LlmError, TokenStream};
use crate::wire::LineBuffer;
use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;

/// Interpretation of one `data:` payload
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Frame {
    /// Reply text (may be empty, in which case nothing is emitted)
    Text(String),
    /// Bookkeeping event with no text
    Skip,
    /// Provider's end-of-stream marker
    End,
}

struct ParseState<S, P> {
    body: Pin<Box<S>>,
    lines: LineBuffer,
    parse: P,
    ready: VecDeque<Result<String, LlmError>>,
    done: bool,
}

impl<S, P> ParseState<S, P>
where
    P: Fn(&str) -> Result<Frame, LlmError>,
{
    fn drain_lines(&mut self) {
        while let Some(line) = self.lines.next_line() {
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            match (self.parse)(data.trim_start()) {
                Ok(Frame::Text(text)) => {
                    if !text.is_empty() {
                        self.ready.push_back(Ok(text));
                    }
                }
                Ok(Frame::Skip) => {}
                Ok(Frame::End) => {
                    self.done = true;
                    return;
                }
                Err(e) => {
                    self.ready.push_back(Err(e));
                    self.done = true;
                    return;
                }
            }
        }
    }
}

/// Turn a provider response body into a [`TokenStream`].
///
/// A body that ends before the provider's end marker is reported as a
/// network error, so a truncated reply is never mistaken for a finished one.
pub(super) fn token_stream<S, B, P>(body: S, parse: P) -> TokenStream
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    P: Fn(&str) -> Result<Frame, LlmError> + Send + 'static,
{
    let state = ParseState {
        body: Box::pin(body),
        lines: LineBuffer::new(),
        parse,
        ready: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    state.lines.push(bytes.as_ref());
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(LlmError::from_transport(&e)), state));
                }
                None => {
                    state.done = true;
                    return Some((
                        Err(LlmError::network("Stream ended before completion")),
                        state,
                    ));
                }
            }
        }
    })
    .boxed()
}
