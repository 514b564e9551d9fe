//! Stream relay
//!
//! Bridges one upstream streaming completion to one downstream event stream.
//! The user message is stored before the provider is called; the assistant
//! reply is stored only after the stream finishes normally, and only after
//! the `Done` event has been handed to the client.

pub mod traits;

#[cfg(test)]
pub mod testing;

pub use traits::ConversationStore;

use crate::db::DbError;
use crate::llm::{LlmError, LlmMessage, LlmRequest, LlmService, MessageRole, TokenStream};
use crate::title::spawn_title_update;
use crate::wire::StreamEvent;
use futures::{FutureExt, StreamExt};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// The only failure text a client ever sees for an upstream problem
pub const UPSTREAM_FAILURE_MESSAGE: &str = "Failed to get AI response";

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Events buffered between the relay task and the response body
const CHANNEL_CAPACITY: usize = 64;

/// Downstream side of one relay invocation
pub type EventStream = ReceiverStream<StreamEvent>;

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Longest allowed wait for the next upstream fragment; `None` waits forever
    pub upstream_idle_timeout: Option<Duration>,
    /// Title new conversations from their first message
    pub generate_titles: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upstream_idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            generate_titles: true,
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("CHAT_UPSTREAM_TIMEOUT_SECS").ok().as_deref(),
            std::env::var("CHAT_GENERATE_TITLES").ok().as_deref(),
        )
    }

    fn from_vars(timeout_secs: Option<&str>, generate_titles: Option<&str>) -> Self {
        let upstream_idle_timeout = match timeout_secs.map(|v| v.trim().parse::<u64>()) {
            Some(Ok(0)) => None,
            Some(Ok(secs)) => Some(Duration::from_secs(secs)),
            Some(Err(_)) => {
                tracing::warn!("Ignoring invalid CHAT_UPSTREAM_TIMEOUT_SECS");
                Some(DEFAULT_IDLE_TIMEOUT)
            }
            None => Some(DEFAULT_IDLE_TIMEOUT),
        };

        let generate_titles = generate_titles.map_or(true, |v| {
            !matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            )
        });

        Self {
            upstream_idle_timeout,
            generate_titles,
        }
    }
}

/// Failures reported before any event is streamed
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Content is required")]
    MissingContent,
    #[error("Conversation not found")]
    ConversationNotFound(i64),
    #[error("Storage error: {0}")]
    Storage(DbError),
}

impl From<DbError> for RelayError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::ConversationNotFound(id) => Self::ConversationNotFound(id),
            other => Self::Storage(other),
        }
    }
}

/// Relays chat replies from a provider to clients
pub struct StreamRelay {
    store: Arc<dyn ConversationStore>,
    chat_llm: Arc<dyn LlmService>,
    title_llm: Option<Arc<dyn LlmService>>,
    config: RelayConfig,
}

impl StreamRelay {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        chat_llm: Arc<dyn LlmService>,
        config: RelayConfig,
    ) -> Self {
        Self {
            store,
            chat_llm,
            title_llm: None,
            config,
        }
    }

    #[must_use]
    pub fn with_title_llm(mut self, title_llm: Arc<dyn LlmService>) -> Self {
        self.title_llm = Some(title_llm);
        self
    }

    /// Start relaying a reply to `content`.
    ///
    /// Validation and the existence check happen first, with no side effects
    /// on failure. On success the user message is already stored and the
    /// returned stream yields zero or more `Chunk`s followed by exactly one
    /// `Done` or `Error`.
    pub async fn open(
        &self,
        conversation_id: i64,
        content: &str,
    ) -> Result<EventStream, RelayError> {
        if content.trim().is_empty() {
            return Err(RelayError::MissingContent);
        }
        if self.store.get_conversation(conversation_id).await?.is_none() {
            return Err(RelayError::ConversationNotFound(conversation_id));
        }

        self.store
            .create_message(conversation_id, MessageRole::User, content)
            .await?;
        let history = self.store.get_messages(conversation_id).await?;

        let user_messages = history
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .count();
        if user_messages == 1 && self.config.generate_titles {
            if let Some(title_llm) = &self.title_llm {
                spawn_title_update(
                    self.store.clone(),
                    title_llm.clone(),
                    conversation_id,
                    content.to_string(),
                );
            }
        }

        let request = LlmRequest::new(
            history
                .into_iter()
                .map(|m| LlmMessage {
                    role: m.role,
                    content: m.content,
                })
                .collect(),
        );

        tracing::info!(
            conversation_id,
            model = %self.chat_llm.model_id(),
            history = request.messages.len(),
            "Relaying reply"
        );

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let task = RelayTask {
            conversation_id,
            request,
            store: self.store.clone(),
            llm: self.chat_llm.clone(),
            idle_timeout: self.config.upstream_idle_timeout,
        };
        tokio::spawn(task.run(tx));

        Ok(ReceiverStream::new(rx))
    }
}

/// One in-flight reply. Owns its accumulator; nothing else touches it.
struct RelayTask {
    conversation_id: i64,
    request: LlmRequest,
    store: Arc<dyn ConversationStore>,
    llm: Arc<dyn LlmService>,
    idle_timeout: Option<Duration>,
}

impl RelayTask {
    async fn run(self, tx: mpsc::Sender<StreamEvent>) {
        let conversation_id = self.conversation_id;

        // A panic in a provider stream is still an upstream failure
        let outcome = AssertUnwindSafe(self.pump(&tx))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(LlmError::unknown("Upstream stream panicked")));

        let reply = match outcome {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    conversation_id,
                    error = %e.message,
                    kind = e.kind.as_str(),
                    retryable = e.kind.is_retryable(),
                    "Upstream failed; discarding partial reply"
                );
                // Ignored: the client may already be gone
                let _ = tx.send(StreamEvent::error(UPSTREAM_FAILURE_MESSAGE)).await;
                return;
            }
        };

        let _ = tx.send(StreamEvent::Done).await;
        drop(tx);

        match self
            .store
            .create_message(conversation_id, MessageRole::Assistant, &reply)
            .await
        {
            Ok(message) => tracing::info!(
                conversation_id,
                message_id = message.id,
                chars = reply.chars().count(),
                "Assistant reply stored"
            ),
            Err(e) => tracing::error!(
                conversation_id,
                error = %e,
                "Failed to store assistant reply"
            ),
        }
    }

    /// Forward fragments until the upstream is exhausted, returning the full text
    async fn pump(&self, tx: &mpsc::Sender<StreamEvent>) -> Result<String, LlmError> {
        let mut upstream: TokenStream =
            within(self.idle_timeout, self.llm.stream(&self.request)).await?;

        let mut reply = String::new();
        let mut client_gone = false;
        loop {
            let next = within(self.idle_timeout, async {
                upstream.next().await.transpose()
            })
            .await?;
            let Some(fragment) = next else {
                return Ok(reply);
            };
            if fragment.is_empty() {
                continue;
            }

            reply.push_str(&fragment);
            if !client_gone && tx.send(StreamEvent::Chunk { content: fragment }).await.is_err() {
                client_gone = true;
                tracing::debug!(
                    conversation_id = self.conversation_id,
                    "Client disconnected; draining upstream"
                );
            }
        }
    }
}

/// Bound an upstream wait by the idle timeout, if one is configured
async fn within<T, F>(limit: Option<Duration>, fut: F) -> Result<T, LlmError>
where
    F: Future<Output = Result<T, LlmError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            LlmError::network(format!("No upstream activity for {}s", limit.as_secs()))
        })?,
        None => fut.await,
    }
}
