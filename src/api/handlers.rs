//! HTTP request handlers

use super::sse::relay_sse;
use super::types::{
    CreateConversationRequest, ErrorResponse, HealthResponse, ModelsResponse, SendMessageRequest,
    SuccessResponse,
};
use super::AppState;
use crate::db::{Conversation, DbError, Message};
use crate::relay::RelayError;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::de::DeserializeOwned;

const NOT_FOUND: &str = "Conversation not found";

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/api/conversations/:id",
            get(get_conversation).delete(delete_conversation),
        )
        .route(
            "/api/conversations/:id/messages",
            get(get_messages).post(send_message).delete(clear_messages),
        )
        .route("/api/models", get(list_models))
        .with_state(state)
}

// ============================================================
// Health
// ============================================================

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

// ============================================================
// Conversations
// ============================================================

async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<Vec<Conversation>>, AppError> {
    let conversations = state
        .db
        .list_conversations()
        .map_err(AppError::storage("Failed to fetch conversations"))?;
    Ok(Json(conversations))
}

async fn create_conversation(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Conversation>, AppError> {
    let req: CreateConversationRequest = parse_body(&body)?;
    let conversation = state
        .db
        .create_conversation(req.title.as_deref())
        .map_err(AppError::storage("Failed to create conversation"))?;

    tracing::info!(conversation_id = conversation.id, "Conversation created");
    Ok(Json(conversation))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Conversation>, AppError> {
    let conversation = state
        .db
        .get_conversation(id)
        .map_err(AppError::storage("Failed to fetch conversation"))?;
    Ok(Json(conversation))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, AppError> {
    state
        .db
        .delete_conversation(id)
        .map_err(AppError::storage("Failed to delete conversation"))?;

    tracing::info!(conversation_id = id, "Conversation deleted");
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// Messages
// ============================================================

async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Message>>, AppError> {
    state
        .db
        .get_conversation(id)
        .map_err(AppError::storage("Failed to fetch messages"))?;
    let messages = state
        .db
        .get_messages(id)
        .map_err(AppError::storage("Failed to fetch messages"))?;
    Ok(Json(messages))
}

/// Store the user message and stream the assistant reply as SSE
async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Response, AppError> {
    let req: SendMessageRequest = parse_body(&body)?;
    let content = req.content.unwrap_or_default();

    // 400 and 404 take precedence over a missing model
    if content.trim().is_empty() {
        return Err(AppError::BadRequest(RelayError::MissingContent.to_string()));
    }
    state
        .db
        .get_conversation(id)
        .map_err(AppError::storage("Failed to send message"))?;

    let Some(relay) = state.relay.as_ref() else {
        return Err(AppError::Unavailable("No LLM models configured".to_string()));
    };

    let events = relay.open(id, &content).await.map_err(|e| match e {
        RelayError::MissingContent => AppError::BadRequest(e.to_string()),
        RelayError::ConversationNotFound(_) => AppError::NotFound(NOT_FOUND.to_string()),
        RelayError::Storage(inner) => {
            tracing::error!(conversation_id = id, error = %inner, "Failed to send message");
            AppError::Internal("Failed to send message".to_string())
        }
    })?;

    Ok(relay_sse(events).into_response())
}

async fn clear_messages(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, AppError> {
    state
        .db
        .get_conversation(id)
        .map_err(AppError::storage("Failed to clear messages"))?;
    let removed = state
        .db
        .delete_messages(id)
        .map_err(AppError::storage("Failed to clear messages"))?;

    tracing::info!(conversation_id = id, removed, "Messages cleared");
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// Model Info
// ============================================================

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.llm_registry.available_model_info(),
        default: state.llm_registry.default_model_id().to_string(),
    })
}

// ============================================================
// Error Handling
// ============================================================

/// Parse a JSON body; an empty body means "all defaults"
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))
}

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl AppError {
    /// Map a storage error; internal detail is logged, not returned
    fn storage(public_message: &'static str) -> impl FnOnce(DbError) -> AppError {
        move |e| match e {
            DbError::ConversationNotFound(_) => AppError::NotFound(NOT_FOUND.to_string()),
            other => {
                tracing::error!(error = %other, "{public_message}");
                AppError::Internal(public_message.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::llm::{MessageRole, ModelRegistry};
    use crate::relay::testing::{MockLlmService, MockStep};
    use crate::relay::RelayConfig;
    use crate::wire::{EventDecoder, StreamEvent};
    use axum::body::Body;
    use axum::http::{header, Request};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct TestApp {
        db: Database,
        llm: Arc<MockLlmService>,
        router: Router,
    }

    fn test_app() -> TestApp {
        let db = Database::open_in_memory().unwrap();
        let llm = Arc::new(MockLlmService::new("mock-model"));
        let registry = Arc::new(ModelRegistry::new_empty().with_service(llm.clone()));
        let config = RelayConfig {
            generate_titles: false,
            ..RelayConfig::default()
        };
        let router = create_router(AppState::new(db.clone(), registry, config));
        TestApp { db, llm, router }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn delete(uri: &str) -> Request<Body> {
        Request::delete(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn error_message(body: &[u8]) -> String {
        serde_json::from_slice::<ErrorResponse>(body).unwrap().error
    }

    async fn wait_for_messages(db: &Database, id: i64, count: usize) {
        for _ in 0..200 {
            if db.get_messages(id).unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {count} messages");
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let (status, body) = send(&app.router, get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "ok");
    }

    #[tokio::test]
    async fn test_create_and_list_conversations() {
        let app = test_app();

        let (status, body) = send(&app.router, post_json("/api/conversations", "")).await;
        assert_eq!(status, StatusCode::OK);
        let first: Conversation = serde_json::from_slice(&body).unwrap();
        assert_eq!(first.title, "New Conversation");
        assert_eq!(first.language, "en");

        let create = post_json("/api/conversations", r#"{"title":"Recipes"}"#);
        let (_, body) = send(&app.router, create).await;
        let second: Conversation = serde_json::from_slice(&body).unwrap();
        assert_eq!(second.title, "Recipes");

        let (status, body) = send(&app.router, get("/api/conversations")).await;
        assert_eq!(status, StatusCode::OK);
        let listed: Vec<Conversation> = serde_json::from_slice(&body).unwrap();
        assert_eq!(listed.iter().map(|c| c.id).collect::<Vec<_>>(), vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_stream_happy_path() {
        let app = test_app();
        let conv = app.db.create_conversation(None).unwrap();
        app.llm.queue_reply(&["Hel", "lo!"]);

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                &format!("/api/conversations/{}/messages", conv.id),
                r#"{"content":"Hi"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/event-stream"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let events = EventDecoder::new().feed(&body);
        assert_eq!(
            events,
            vec![
                StreamEvent::chunk("Hel"),
                StreamEvent::chunk("lo!"),
                StreamEvent::Done
            ]
        );

        wait_for_messages(&app.db, conv.id, 2).await;
        let messages = app.db.get_messages(conv.id).unwrap();
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].content, "Hello!");

        let (status, body) = send(
            &app.router,
            Request::get(format!("/api/conversations/{}/messages", conv.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let listed: Vec<Message> = serde_json::from_slice(&body).unwrap();
        assert_eq!(listed, messages);
    }

    #[tokio::test]
    async fn test_stream_upstream_failure() {
        let app = test_app();
        let conv = app.db.create_conversation(None).unwrap();
        app.llm.queue_steps(vec![
            MockStep::Fragment("Par".to_string()),
            MockStep::Fail("boom".to_string()),
        ]);

        let (status, body) = send(
            &app.router,
            post_json(
                &format!("/api/conversations/{}/messages", conv.id),
                r#"{"content":"Hi"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            EventDecoder::new().feed(&body),
            vec![
                StreamEvent::chunk("Par"),
                StreamEvent::error("Failed to get AI response")
            ]
        );
        assert_eq!(app.db.get_messages(conv.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_send_validation_and_not_found() {
        let app = test_app();
        let conv = app.db.create_conversation(None).unwrap();
        let uri = format!("/api/conversations/{}/messages", conv.id);

        let (status, body) = send(&app.router, post_json(&uri, "{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_message(&body), "Content is required");

        let (status, _) = send(&app.router, post_json(&uri, "not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app.router,
            post_json("/api/conversations/999/messages", r#"{"content":"Hi"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_message(&body), "Conversation not found");

        assert!(app.llm.recorded_requests().is_empty());
        assert!(app.db.get_messages(conv.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_without_models() {
        let db = Database::open_in_memory().unwrap();
        let conv = db.create_conversation(None).unwrap();
        let router = create_router(AppState::new(
            db,
            Arc::new(ModelRegistry::new_empty()),
            RelayConfig::default(),
        ));

        let (status, _) = send(
            &router,
            post_json(
                &format!("/api/conversations/{}/messages", conv.id),
                r#"{"content":"Hi"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, body) = send(
            &router,
            post_json(&format!("/api/conversations/{}/messages", conv.id), "{}"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_message(&body), "Content is required");

        let (status, body) = send(
            &router,
            post_json("/api/conversations/999/messages", r#"{"content":"Hi"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_message(&body), "Conversation not found");
    }

    #[tokio::test]
    async fn test_clear_and_delete() {
        let app = test_app();
        let conv = app.db.create_conversation(None).unwrap();
        app.db.add_message(conv.id, MessageRole::User, "Hi").unwrap();
        let uri = format!("/api/conversations/{}", conv.id);

        let (status, body) = send(
            &app.router,
            Request::delete(format!("{uri}/messages")).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(serde_json::from_slice::<SuccessResponse>(&body).unwrap().success);
        assert!(app.db.get_messages(conv.id).unwrap().is_empty());

        let (status, _) = send(&app.router, delete(&uri)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app.router, get(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app.router, delete(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_models() {
        let app = test_app();
        let (status, body) = send(&app.router, get("/api/models")).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["default"], "mock-model");
        assert_eq!(json["models"][0]["id"], "mock-model");
    }
}
