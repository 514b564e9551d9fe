//! HTTP client for the chat relay
//!
//! Typed REST calls plus the stream consumer that turns a message response
//! into `on_chunk` / `on_complete` / `on_error` callbacks.

use crate::api::{CreateConversationRequest, ErrorResponse, SendMessageRequest, SuccessResponse};
use crate::db::{Conversation, Message};
use crate::wire::{decode_stream, StreamEvent};
use futures::{Stream, StreamExt};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;

/// Reported when the connection drops before a terminal event
pub const TRANSPORT_FAILURE_MESSAGE: &str = "Connection lost before the response completed";

/// Reported when the request never reached the server
pub const REQUEST_FAILURE_MESSAGE: &str = "Could not reach the chat server";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{message}")]
    Status { status: u16, message: String },
}

/// Reactions to one message stream.
///
/// At most one of `on_complete` and `on_error` is invoked, at most once.
pub trait StreamHandler: Send {
    fn on_chunk(&mut self, text: &str);
    fn on_complete(&mut self);
    fn on_error(&mut self, message: &str);
}

/// How a message stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Failed(String),
}

// ============================================================================
// Client
// ============================================================================

#[derive(Debug, Clone)]
pub struct ChatClient {
    http: Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        let response = self.http.get(self.url("/api/conversations")).send().await?;
        read_json(response).await
    }

    pub async fn create_conversation(
        &self,
        title: Option<&str>,
    ) -> Result<Conversation, ClientError> {
        let body = CreateConversationRequest {
            title: title.map(str::to_string),
        };
        let response = self
            .http
            .post(self.url("/api/conversations"))
            .json(&body)
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn get_conversation(&self, id: i64) -> Result<Conversation, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/api/conversations/{id}")))
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn get_messages(&self, conversation_id: i64) -> Result<Vec<Message>, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/api/conversations/{conversation_id}/messages")))
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn clear_messages(&self, conversation_id: i64) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(self.url(&format!("/api/conversations/{conversation_id}/messages")))
            .send()
            .await?;
        read_json::<SuccessResponse>(response).await.map(|_| ())
    }

    pub async fn delete_conversation(&self, id: i64) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(self.url(&format!("/api/conversations/{id}")))
            .send()
            .await?;
        read_json::<SuccessResponse>(response).await.map(|_| ())
    }

    /// Send a message and drive the reply stream through `handler`.
    ///
    /// Every failure, including a rejected request, ends in exactly one
    /// `on_error` call; nothing is returned as an `Err`.
    pub async fn send_message(
        &self,
        conversation_id: i64,
        content: &str,
        handler: &mut dyn StreamHandler,
    ) -> StreamOutcome {
        let body = SendMessageRequest {
            content: Some(content.to_string()),
        };
        let result = self
            .http
            .post(self.url(&format!("/api/conversations/{conversation_id}/messages")))
            .json(&body)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(conversation_id, error = %e, "Message request failed");
                return fail(handler, REQUEST_FAILURE_MESSAGE.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = status_message(status, &body);
            tracing::warn!(conversation_id, status = status.as_u16(), %message, "Message rejected");
            return fail(handler, message);
        }

        consume_event_stream(response.bytes_stream(), handler).await
    }
}

// ============================================================================
// Stream Consumer
// ============================================================================

/// Decode a response body and dispatch its events to `handler`.
///
/// Stops reading at the first terminal event. A body that errors or ends
/// without one is reported as a transport failure.
pub async fn consume_event_stream<S, B, E>(
    body: S,
    handler: &mut dyn StreamHandler,
) -> StreamOutcome
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut events = Box::pin(decode_stream(body));

    while let Some(item) = events.next().await {
        match item {
            Ok(StreamEvent::Chunk { content }) => handler.on_chunk(&content),
            Ok(StreamEvent::Done) => {
                handler.on_complete();
                return StreamOutcome::Completed;
            }
            Ok(StreamEvent::Error { message }) => return fail(handler, message),
            Err(e) => {
                tracing::warn!(error = %e, "Stream read failed");
                break;
            }
        }
    }

    fail(handler, TRANSPORT_FAILURE_MESSAGE.to_string())
}

fn fail(handler: &mut dyn StreamHandler, message: String) -> StreamOutcome {
    handler.on_error(&message);
    StreamOutcome::Failed(message)
}

// ============================================================================
// Response Helpers
// ============================================================================

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Status {
            status: status.as_u16(),
            message: status_message(status, &body),
        });
    }
    Ok(response.json().await?)
}

/// Prefer the server's `{error}` message, else describe the status
fn status_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| format!("Request failed with status {}", status.as_u16()))
}
