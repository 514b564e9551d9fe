//! Mock implementations for testing
//!
//! These mocks let the relay, title generation and HTTP layer run without a
//! real provider or database file.

use super::traits::ConversationStore;
use crate::db::{Conversation, DbError, DbResult, Message, DEFAULT_LANGUAGE, DEFAULT_TITLE};
use crate::llm::{
    LlmError, LlmRequest, LlmResponse, LlmService, MessageRole, TokenStream, Usage,
};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

// ============================================================================
// Mock LLM Service
// ============================================================================

/// One step of a scripted streaming reply
#[derive(Debug, Clone)]
pub enum MockStep {
    Fragment(String),
    /// Fail the stream with a server error
    Fail(String),
    /// Never produce another item
    Stall,
    /// Panic inside the stream
    Panic,
}

/// Scripted outcome of one `complete` call
#[derive(Debug, Clone)]
pub enum MockCompletion {
    Text(String),
    Fail(String),
    Stall,
}

/// Mock LLM service that plays back queued scripts
pub struct MockLlmService {
    model_id: String,
    streams: Mutex<VecDeque<Result<Vec<MockStep>, String>>>,
    completions: Mutex<VecDeque<MockCompletion>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmService {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            streams: Mutex::new(VecDeque::new()),
            completions: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a reply that streams `fragments` and then ends normally
    pub fn queue_reply(&self, fragments: &[&str]) {
        self.queue_steps(
            fragments
                .iter()
                .map(|f| MockStep::Fragment((*f).to_string()))
                .collect(),
        );
    }

    pub fn queue_steps(&self, steps: Vec<MockStep>) {
        self.streams.lock().unwrap().push_back(Ok(steps));
    }

    /// Queue a stream that fails before producing anything
    pub fn queue_open_error(&self, message: impl Into<String>) {
        self.streams.lock().unwrap().push_back(Err(message.into()));
    }

    pub fn queue_completion(&self, completion: MockCompletion) {
        self.completions.lock().unwrap().push_back(completion);
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.completions.lock().unwrap().pop_front();
        match next {
            Some(MockCompletion::Text(text)) => Ok(LlmResponse {
                text,
                usage: Usage::default(),
            }),
            Some(MockCompletion::Fail(message)) => Err(LlmError::server_error(message)),
            Some(MockCompletion::Stall) => {
                futures::future::pending::<()>().await;
                Err(LlmError::network("unreachable"))
            }
            None => Err(LlmError::network("No mock completion queued")),
        }
    }

    async fn stream(&self, request: &LlmRequest) -> Result<TokenStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.streams.lock().unwrap().pop_front();
        let steps = match next {
            Some(Ok(steps)) => steps,
            Some(Err(message)) => return Err(LlmError::auth(message)),
            None => return Err(LlmError::network("No mock stream queued")),
        };

        let items = stream::unfold(VecDeque::from(steps), |mut steps| async move {
            match steps.pop_front()? {
                MockStep::Fragment(text) => Some((Ok(text), steps)),
                MockStep::Fail(message) => {
                    Some((Err(LlmError::server_error(message)), VecDeque::new()))
                }
                MockStep::Stall => {
                    futures::future::pending::<()>().await;
                    None
                }
                MockStep::Panic => panic!("mock provider stream panicked"),
            }
        });
        Ok(items.boxed())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn context_window(&self) -> usize {
        128_000
    }
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
struct StoreState {
    conversations: HashMap<i64, Conversation>,
    messages: Vec<Message>,
    next_id: i64,
}

/// In-memory conversation store
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_conversation(&self) -> Conversation {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let conversation = Conversation {
            id: state.next_id,
            title: DEFAULT_TITLE.to_string(),
            session_id: uuid::Uuid::new_v4().to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            created_at: Utc::now(),
        };
        state
            .conversations
            .insert(conversation.id, conversation.clone());
        conversation
    }

    pub fn messages(&self, conversation_id: i64) -> Vec<Message> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub fn title(&self, conversation_id: i64) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .conversations
            .get(&conversation_id)
            .map(|c| c.title.clone())
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn get_conversation(&self, id: i64) -> DbResult<Option<Conversation>> {
        Ok(self.state.lock().unwrap().conversations.get(&id).cloned())
    }

    async fn create_message(
        &self,
        conversation_id: i64,
        role: MessageRole,
        content: &str,
    ) -> DbResult<Message> {
        let mut state = self.state.lock().unwrap();
        if !state.conversations.contains_key(&conversation_id) {
            return Err(DbError::ConversationNotFound(conversation_id));
        }
        state.next_id += 1;
        let message = Message {
            id: state.next_id,
            conversation_id,
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn get_messages(&self, conversation_id: i64) -> DbResult<Vec<Message>> {
        Ok(self.messages(conversation_id))
    }

    async fn update_title(&self, conversation_id: i64, title: &str) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        let conversation = state
            .conversations
            .get_mut(&conversation_id)
            .ok_or(DbError::ConversationNotFound(conversation_id))?;
        conversation.title = title.to_string();
        Ok(())
    }
}
