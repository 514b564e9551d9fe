//! Conversation title generation using a fast/cheap LLM
//!
//! Generates a short title from the first user message and writes it back
//! to the conversation in the background.

use crate::llm::{LlmMessage, LlmRequest, LlmService};
use crate::relay::ConversationStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const TITLE_PROMPT: &str = "Generate a short, descriptive title (3-5 words) for a conversation that starts with the following message. Respond only with the title, no quotes or formatting.";

const TITLE_TIMEOUT: Duration = Duration::from_secs(10);
const TITLE_MAX_TOKENS: u32 = 20;
const MAX_PROMPT_CHARS: usize = 500;
const MAX_TITLE_CHARS: usize = 60;

/// Generate a title for a conversation based on its first message.
///
/// Returns None if generation fails or times out; the caller keeps the
/// existing title in that case.
pub async fn generate_title(message_text: &str, llm_service: &dyn LlmService) -> Option<String> {
    let truncated: String = message_text.chars().take(MAX_PROMPT_CHARS).collect();

    let request = LlmRequest::new(vec![LlmMessage::user(truncated)])
        .with_system(TITLE_PROMPT)
        .with_max_tokens(TITLE_MAX_TOKENS);

    match timeout(TITLE_TIMEOUT, llm_service.complete(&request)).await {
        Ok(Ok(response)) => sanitize_title(&response.text),
        Ok(Err(e)) => {
            tracing::warn!(error = %e.message, "Title generation LLM error");
            None
        }
        Err(_) => {
            tracing::warn!("Title generation timed out");
            None
        }
    }
}

/// Generate a title and store it, off the request path
pub fn spawn_title_update(
    store: Arc<dyn ConversationStore>,
    llm_service: Arc<dyn LlmService>,
    conversation_id: i64,
    message_text: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let Some(title) = generate_title(&message_text, llm_service.as_ref()).await else {
            return;
        };
        match store.update_title(conversation_id, &title).await {
            Ok(()) => tracing::info!(conversation_id, title = %title, "Conversation titled"),
            Err(e) => tracing::warn!(conversation_id, error = %e, "Failed to store title"),
        }
    })
}

/// Clean up model output for display.
/// - Strip surrounding quotes and trailing punctuation
/// - Collapse whitespace
/// - Truncate at a word boundary
fn sanitize_title(raw: &str) -> Option<String> {
    let line = raw.lines().find(|l| !l.trim().is_empty())?;
    let stripped = line
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '#'))
        .trim_end_matches(['.', '!', '?', ':'])
        .trim();

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    if collapsed.chars().count() <= MAX_TITLE_CHARS {
        return Some(collapsed);
    }

    let mut title = String::new();
    for word in collapsed.split(' ') {
        let needed = usize::from(!title.is_empty()) + word.chars().count();
        if title.chars().count() + needed > MAX_TITLE_CHARS {
            break;
        }
        if !title.is_empty() {
            title.push(' ');
        }
        title.push_str(word);
    }
    if title.is_empty() {
        // Single overlong word
        title = collapsed.chars().take(MAX_TITLE_CHARS).collect();
    }
    Some(title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::{InMemoryStore, MockCompletion, MockLlmService};

    #[test]
    fn test_sanitize_title() {
        assert_eq!(
            sanitize_title("\"Planning a Trip to Kyoto\"").as_deref(),
            Some("Planning a Trip to Kyoto")
        );
        assert_eq!(
            sanitize_title("  Rust   Borrow Checker.\n").as_deref(),
            Some("Rust Borrow Checker")
        );
        assert_eq!(sanitize_title("\n\nSecond line title"), Some("Second line title".to_string()));
        assert_eq!(sanitize_title("  \"\" "), None);
    }

    #[test]
    fn test_sanitize_title_truncation() {
        let long = "word ".repeat(30);
        let title = sanitize_title(&long).unwrap();
        assert!(title.chars().count() <= MAX_TITLE_CHARS);
        assert!(!title.ends_with(' '));

        let one_word = "ü".repeat(100);
        assert_eq!(
            sanitize_title(&one_word).unwrap().chars().count(),
            MAX_TITLE_CHARS
        );
    }

    #[tokio::test]
    async fn test_generate_title_request_shape() {
        let llm = MockLlmService::new("cheap");
        llm.queue_completion(MockCompletion::Text("Weekend Hiking Plans".to_string()));

        let title = generate_title("Where should I hike this weekend?", &llm).await;
        assert_eq!(title.as_deref(), Some("Weekend Hiking Plans"));

        let requests = llm.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].max_tokens, Some(TITLE_MAX_TOKENS));
        assert!(requests[0].system.as_deref().unwrap().contains("3-5 words"));
    }

    #[tokio::test]
    async fn test_generate_title_failure() {
        let llm = MockLlmService::new("cheap");
        llm.queue_completion(MockCompletion::Fail("overloaded".to_string()));
        assert_eq!(generate_title("Hi", &llm).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_title_timeout() {
        let llm = MockLlmService::new("cheap");
        llm.queue_completion(MockCompletion::Stall);
        assert_eq!(generate_title("Hi", &llm).await, None);
    }

    #[tokio::test]
    async fn test_spawn_title_update_writes_back() {
        let store = Arc::new(InMemoryStore::new());
        let conv = store.create_conversation();
        let llm = Arc::new(MockLlmService::new("cheap"));
        llm.queue_completion(MockCompletion::Text("Greeting Exchange".to_string()));

        spawn_title_update(store.clone(), llm, conv.id, "Hi".to_string())
            .await
            .unwrap();
        assert_eq!(store.title(conv.id).as_deref(), Some("Greeting Exchange"));
    }

    #[tokio::test]
    async fn test_failed_title_keeps_existing() {
        let store = Arc::new(InMemoryStore::new());
        let conv = store.create_conversation();
        let llm = Arc::new(MockLlmService::new("cheap"));

        spawn_title_update(store.clone(), llm, conv.id, "Hi".to_string())
            .await
            .unwrap();
        assert_eq!(store.title(conv.id).as_deref(), Some("New Conversation"));
    }
}
