//! Server-Sent Events support
//!
//! Frames relay events as `data: <json>` records.

use crate::wire::StreamEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;

/// Convert a relay event stream into an SSE response
pub fn relay_sse<S>(events: S) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    let frames = events.map(|event| Ok::<_, Infallible>(Event::default().data(event.to_json())));

    // Keep-alives are comment lines, which decoders skip
    Sse::new(frames).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
