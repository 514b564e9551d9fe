//! Events that drive the orchestrator

/// Inputs to the transition function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    // User events
    SendMessage {
        text: String,
    },
    ConversationSelected {
        conversation_id: Option<i64>,
    },

    // Conversation creation
    ConversationCreated {
        conversation_id: i64,
    },
    ConversationCreateFailed {
        message: String,
    },

    // Stream callbacks
    Chunk {
        conversation_id: i64,
        text: String,
    },
    StreamCompleted {
        conversation_id: i64,
    },
    StreamFailed {
        conversation_id: i64,
        message: String,
    },
}
