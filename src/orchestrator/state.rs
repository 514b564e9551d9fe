//! Orchestrator state types

/// Where the conversation view is in its send cycle.
///
/// `accumulated` is the provisional assistant text. It is shown apart from
/// the persisted history and dropped when the stream ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatState {
    /// Input enabled
    Idle { selected: Option<i64> },

    /// No conversation was selected; one is being created for `pending_text`
    AwaitingConversation { pending_text: String },

    /// Reply streaming into `conversation_id`; input disabled
    Streaming {
        conversation_id: i64,
        accumulated: String,
    },
}

impl Default for ChatState {
    fn default() -> Self {
        ChatState::Idle { selected: None }
    }
}

impl ChatState {
    pub fn is_busy(&self) -> bool {
        !matches!(self, ChatState::Idle { .. })
    }

    /// The conversation input currently targets
    pub fn conversation_id(&self) -> Option<i64> {
        match self {
            ChatState::Idle { selected } => *selected,
            ChatState::AwaitingConversation { .. } => None,
            ChatState::Streaming {
                conversation_id, ..
            } => Some(*conversation_id),
        }
    }

    /// Provisional reply text, empty unless streaming
    pub fn provisional_text(&self) -> &str {
        match self {
            ChatState::Streaming { accumulated, .. } => accumulated,
            _ => "",
        }
    }
}
