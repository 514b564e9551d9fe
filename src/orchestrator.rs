//! Conversation orchestrator
//!
//! Implements the Elm Architecture pattern: a pure `transition` function plus
//! a small runtime that executes the effects it returns against a backend
//! and reports to a view.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::ChatEvent;
pub use state::ChatState;
pub use transition::{transition, TransitionError, TransitionResult};

use crate::client::{ChatClient, ClientError, StreamHandler, StreamOutcome};
use crate::db::{Conversation, Message};
use async_trait::async_trait;
use std::collections::VecDeque;

/// Shown when a conversation cannot be created for the first message
pub const CREATE_FAILURE_MESSAGE: &str = "Failed to create new conversation";

// ============================================================================
// Seams
// ============================================================================

/// Server operations the orchestrator depends on
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn create_conversation(&self) -> Result<Conversation, ClientError>;

    async fn get_messages(&self, conversation_id: i64) -> Result<Vec<Message>, ClientError>;

    /// Stream a reply; reports through `handler` and never fails otherwise
    async fn send_message(
        &self,
        conversation_id: i64,
        text: &str,
        handler: &mut dyn StreamHandler,
    ) -> StreamOutcome;
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn create_conversation(&self) -> Result<Conversation, ClientError> {
        ChatClient::create_conversation(self, None).await
    }

    async fn get_messages(&self, conversation_id: i64) -> Result<Vec<Message>, ClientError> {
        ChatClient::get_messages(self, conversation_id).await
    }

    async fn send_message(
        &self,
        conversation_id: i64,
        text: &str,
        handler: &mut dyn StreamHandler,
    ) -> StreamOutcome {
        ChatClient::send_message(self, conversation_id, text, handler).await
    }
}

/// What the user sees. Provisional text arrives through `on_chunk` and is
/// never part of the history passed to `on_history`.
pub trait ChatView: Send {
    fn on_conversation_created(&mut self, _conversation: &Conversation) {}

    fn on_chunk(&mut self, _delta: &str, _accumulated: &str) {}

    /// Persisted history for the selected conversation (`None`: nothing selected)
    fn on_history(&mut self, _conversation_id: Option<i64>, _messages: &[Message]) {}

    fn on_error(&mut self, _message: &str) {}
}

// ============================================================================
// Runtime
// ============================================================================

pub struct Orchestrator<B, V> {
    backend: B,
    view: V,
    state: ChatState,
}

impl<B: ChatBackend, V: ChatView> Orchestrator<B, V> {
    pub fn new(backend: B, view: V) -> Self {
        Self {
            backend,
            view,
            state: ChatState::default(),
        }
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Send a message and run until the reply stream has ended.
    ///
    /// Rejected without side effects while a reply is in progress or when
    /// the text is blank.
    pub async fn send_message(&mut self, text: &str) -> Result<(), TransitionError> {
        let result = transition(
            &self.state,
            ChatEvent::SendMessage {
                text: text.to_string(),
            },
        )?;
        self.state = result.new_state;
        self.run(result.effects).await;
        Ok(())
    }

    /// Switch conversations, dropping any provisional text
    pub async fn select_conversation(&mut self, conversation_id: Option<i64>) {
        let effects = advance(&mut self.state, ChatEvent::ConversationSelected { conversation_id });
        self.run(effects).await;
    }

    async fn run(&mut self, effects: Vec<Effect>) {
        let mut queue = VecDeque::from(effects);
        while let Some(effect) = queue.pop_front() {
            tracing::debug!(?effect, "Executing effect");
            let follow_up = self.execute(effect).await;
            queue.extend(follow_up);
        }
    }

    async fn execute(&mut self, effect: Effect) -> Vec<Effect> {
        match effect {
            Effect::CreateConversation => {
                let event = match self.backend.create_conversation().await {
                    Ok(conversation) => {
                        self.view.on_conversation_created(&conversation);
                        ChatEvent::ConversationCreated {
                            conversation_id: conversation.id,
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to create conversation");
                        ChatEvent::ConversationCreateFailed {
                            message: CREATE_FAILURE_MESSAGE.to_string(),
                        }
                    }
                };
                advance(&mut self.state, event)
            }

            Effect::StartStream {
                conversation_id,
                text,
            } => {
                let mut bridge = StreamBridge {
                    conversation_id,
                    state: &mut self.state,
                    view: &mut self.view,
                    effects: Vec::new(),
                };
                let outcome = self
                    .backend
                    .send_message(conversation_id, &text, &mut bridge)
                    .await;
                tracing::debug!(conversation_id, ?outcome, "Stream ended");
                bridge.effects
            }

            Effect::RefetchMessages { conversation_id } => {
                match self.backend.get_messages(conversation_id).await {
                    Ok(messages) => self.view.on_history(Some(conversation_id), &messages),
                    Err(e) => {
                        tracing::warn!(conversation_id, error = %e, "Failed to load messages");
                        self.view.on_error(&e.to_string());
                    }
                }
                vec![]
            }

            Effect::ClearMessages => {
                self.view.on_history(None, &[]);
                vec![]
            }

            Effect::ShowError { message } => {
                self.view.on_error(&message);
                vec![]
            }
        }
    }
}

/// Apply `event`, returning its effects. Stale events are logged and dropped.
fn advance(state: &mut ChatState, event: ChatEvent) -> Vec<Effect> {
    match transition(state, event) {
        Ok(result) => {
            *state = result.new_state;
            result.effects
        }
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring event");
            vec![]
        }
    }
}

/// Feeds stream callbacks back through the state machine
struct StreamBridge<'a, V> {
    conversation_id: i64,
    state: &'a mut ChatState,
    view: &'a mut V,
    effects: Vec<Effect>,
}

impl<V: ChatView> StreamHandler for StreamBridge<'_, V> {
    fn on_chunk(&mut self, text: &str) {
        let event = ChatEvent::Chunk {
            conversation_id: self.conversation_id,
            text: text.to_string(),
        };
        match transition(self.state, event) {
            Ok(result) => {
                *self.state = result.new_state;
                self.view.on_chunk(text, self.state.provisional_text());
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring chunk"),
        }
    }

    fn on_complete(&mut self) {
        let effects = advance(
            self.state,
            ChatEvent::StreamCompleted {
                conversation_id: self.conversation_id,
            },
        );
        self.effects.extend(effects);
    }

    fn on_error(&mut self, message: &str) {
        let effects = advance(
            self.state,
            ChatEvent::StreamFailed {
                conversation_id: self.conversation_id,
                message: message.to_string(),
            },
        );
        self.effects.extend(effects);
    }
}
