//! LLM provider abstraction
//!
//! Provides a common interface for one-shot completions and streamed replies
//! across providers.

mod anthropic;
mod error;
mod models;
mod openai;
mod registry;
mod sse;
mod types;

pub use anthropic::{AnthropicModel, AnthropicService};
pub use error::{LlmError, LlmErrorKind};
pub use models::{all_models, ModelDef, Provider};
pub use openai::{OpenAIModel, OpenAIService};
pub use registry::{LlmConfig, ModelInfo, ModelRegistry};
pub use types::*;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;

/// Common interface for LLM providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Open a streaming completion.
    ///
    /// Errors before the first byte (auth, bad request) are returned directly;
    /// failures after that arrive as an `Err` item that ends the stream.
    async fn stream(&self, request: &LlmRequest) -> Result<TokenStream, LlmError>;

    fn model_id(&self) -> &str;

    /// Get the context window size in tokens
    fn context_window(&self) -> usize;
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

struct StreamLog {
    inner: TokenStream,
    model_id: String,
    start: Instant,
    fragments: usize,
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = e.kind.as_str(),
                    retryable = e.kind.is_retryable(),
                    "LLM request failed"
                );
            }
        }

        result
    }

    async fn stream(&self, request: &LlmRequest) -> Result<TokenStream, LlmError> {
        let start = Instant::now();
        let inner = match self.inner.stream(request).await {
            Ok(inner) => inner,
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %start.elapsed().as_millis(),
                    error = %e.message,
                    kind = e.kind.as_str(),
                    "LLM stream failed to open"
                );
                return Err(e);
            }
        };

        tracing::debug!(
            model = %self.model_id,
            messages = request.messages.len(),
            "LLM stream opened"
        );

        let log = StreamLog {
            inner,
            model_id: self.model_id.clone(),
            start,
            fragments: 0,
        };

        let logged = stream::unfold(Some(log), |log| async move {
            let mut log = log?;
            match log.inner.next().await {
                Some(Ok(text)) => {
                    log.fragments += 1;
                    Some((Ok(text), Some(log)))
                }
                Some(Err(e)) => {
                    tracing::error!(
                        model = %log.model_id,
                        duration_ms = %log.start.elapsed().as_millis(),
                        fragments = log.fragments,
                        error = %e.message,
                        kind = e.kind.as_str(),
                        "LLM stream failed"
                    );
                    Some((Err(e), None))
                }
                None => {
                    tracing::info!(
                        model = %log.model_id,
                        duration_ms = %log.start.elapsed().as_millis(),
                        fragments = log.fragments,
                        "LLM stream completed"
                    );
                    None
                }
            }
        });

        Ok(logged.boxed())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn context_window(&self) -> usize {
        self.inner.context_window()
    }
}
