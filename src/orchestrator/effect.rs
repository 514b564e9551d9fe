//! Effects produced by state transitions

/// Work for the runtime to perform after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Create a conversation for the pending message
    CreateConversation,

    /// Send `text` and consume the reply stream
    StartStream { conversation_id: i64, text: String },

    /// Load persisted history, the source of truth after a stream
    RefetchMessages { conversation_id: i64 },

    /// Nothing selected; show an empty history
    ClearMessages,

    /// Surface a failure to the user
    ShowError { message: String },
}

impl Effect {
    pub fn show_error(message: impl Into<String>) -> Self {
        Effect::ShowError {
            message: message.into(),
        }
    }
}
