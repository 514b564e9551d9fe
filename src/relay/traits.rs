//! Storage seam for the relay
//!
//! The relay only needs a handful of persistence operations. Keeping them
//! behind a trait lets tests run the relay against an in-memory store.

use crate::db::{Conversation, Database, DbError, DbResult, Message};
use crate::llm::MessageRole;
use async_trait::async_trait;
use std::sync::Arc;

/// Persistence operations used while relaying a reply
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Existence check; `Ok(None)` when the conversation is unknown
    async fn get_conversation(&self, id: i64) -> DbResult<Option<Conversation>>;

    async fn create_message(
        &self,
        conversation_id: i64,
        role: MessageRole,
        content: &str,
    ) -> DbResult<Message>;

    /// History in chronological order
    async fn get_messages(&self, conversation_id: i64) -> DbResult<Vec<Message>>;

    async fn update_title(&self, conversation_id: i64, title: &str) -> DbResult<()>;
}

#[async_trait]
impl<T: ConversationStore + ?Sized> ConversationStore for Arc<T> {
    async fn get_conversation(&self, id: i64) -> DbResult<Option<Conversation>> {
        (**self).get_conversation(id).await
    }

    async fn create_message(
        &self,
        conversation_id: i64,
        role: MessageRole,
        content: &str,
    ) -> DbResult<Message> {
        (**self).create_message(conversation_id, role, content).await
    }

    async fn get_messages(&self, conversation_id: i64) -> DbResult<Vec<Message>> {
        (**self).get_messages(conversation_id).await
    }

    async fn update_title(&self, conversation_id: i64, title: &str) -> DbResult<()> {
        (**self).update_title(conversation_id, title).await
    }
}

// ============================================================================
// Production Adapter
// ============================================================================

#[async_trait]
impl ConversationStore for Database {
    async fn get_conversation(&self, id: i64) -> DbResult<Option<Conversation>> {
        match Database::get_conversation(self, id) {
            Ok(conversation) => Ok(Some(conversation)),
            Err(DbError::ConversationNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_message(
        &self,
        conversation_id: i64,
        role: MessageRole,
        content: &str,
    ) -> DbResult<Message> {
        self.add_message(conversation_id, role, content)
    }

    async fn get_messages(&self, conversation_id: i64) -> DbResult<Vec<Message>> {
        Database::get_messages(self, conversation_id)
    }

    async fn update_title(&self, conversation_id: i64, title: &str) -> DbResult<()> {
        Database::update_title(self, conversation_id, title)
    }
}
