//! Pure state transition function
//!
//! Given the same state and event it always produces the same result. All
//! I/O is described by the returned effects.

use super::{ChatEvent, ChatState, Effect};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ChatState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ChatState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("A reply is still in progress")]
    Busy,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

pub fn transition(
    state: &ChatState,
    event: ChatEvent,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Sending
        // ============================================================

        (ChatState::Idle { .. }, ChatEvent::SendMessage { text }) if text.trim().is_empty() => {
            Err(TransitionError::EmptyMessage)
        }

        // Idle + SendMessage (nothing selected) -> AwaitingConversation
        (ChatState::Idle { selected: None }, ChatEvent::SendMessage { text }) => Ok(
            TransitionResult::new(ChatState::AwaitingConversation { pending_text: text })
                .with_effect(Effect::CreateConversation),
        ),

        // Idle + SendMessage (selected) -> Streaming
        (ChatState::Idle { selected: Some(id) }, ChatEvent::SendMessage { text }) => {
            Ok(start_stream(*id, text))
        }

        (
            ChatState::AwaitingConversation { .. } | ChatState::Streaming { .. },
            ChatEvent::SendMessage { .. },
        ) => Err(TransitionError::Busy),

        // ============================================================
        // Conversation Creation
        // ============================================================

        (
            ChatState::AwaitingConversation { pending_text },
            ChatEvent::ConversationCreated { conversation_id },
        ) => Ok(start_stream(conversation_id, pending_text.clone())),

        // The typed text is not resent
        (
            ChatState::AwaitingConversation { .. },
            ChatEvent::ConversationCreateFailed { message },
        ) => Ok(TransitionResult::new(ChatState::Idle { selected: None })
            .with_effect(Effect::ShowError { message })),

        // ============================================================
        // Streaming
        // ============================================================

        (
            ChatState::Streaming {
                conversation_id,
                accumulated,
            },
            ChatEvent::Chunk {
                conversation_id: from,
                text,
            },
        ) if *conversation_id == from => Ok(TransitionResult::new(ChatState::Streaming {
            conversation_id: *conversation_id,
            accumulated: format!("{accumulated}{text}"),
        })),

        // Provisional text is discarded; history is reloaded from the server
        (
            ChatState::Streaming {
                conversation_id, ..
            },
            ChatEvent::StreamCompleted {
                conversation_id: from,
            },
        ) if *conversation_id == from => Ok(TransitionResult::new(ChatState::Idle {
            selected: Some(*conversation_id),
        })
        .with_effect(Effect::RefetchMessages {
            conversation_id: *conversation_id,
        })),

        (
            ChatState::Streaming {
                conversation_id, ..
            },
            ChatEvent::StreamFailed {
                conversation_id: from,
                message,
            },
        ) if *conversation_id == from => Ok(TransitionResult::new(ChatState::Idle {
            selected: Some(*conversation_id),
        })
        .with_effect(Effect::ShowError { message })),

        // ============================================================
        // Selection
        // ============================================================

        // Allowed from any state; transient text never follows the selection
        (_, ChatEvent::ConversationSelected { conversation_id }) => {
            let effect = match conversation_id {
                Some(id) => Effect::RefetchMessages {
                    conversation_id: id,
                },
                None => Effect::ClearMessages,
            };
            Ok(TransitionResult::new(ChatState::Idle {
                selected: conversation_id,
            })
            .with_effect(effect))
        }

        // ============================================================
        // Invalid Transitions
        // ============================================================

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{event:?} in {state:?}"
        ))),
    }
}

fn start_stream(conversation_id: i64, text: String) -> TransitionResult {
    TransitionResult::new(ChatState::Streaming {
        conversation_id,
        accumulated: String::new(),
    })
    .with_effect(Effect::StartStream {
        conversation_id,
        text,
    })
}
