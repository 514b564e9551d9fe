//! Centralized model definitions for all LLM providers

use super::anthropic::AnthropicModel;
use super::openai::OpenAIModel;
use super::{AnthropicService, LlmError, LlmService, OpenAIService};
use std::sync::Arc;

/// LLM provider enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Anthropic,
    OpenAI,
}

impl Provider {
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Anthropic => "Anthropic",
            Provider::OpenAI => "OpenAI",
        }
    }

    pub fn api_key_env_var(self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAI => "OPENAI_API_KEY",
        }
    }
}

/// Which concrete client backs a model
#[derive(Debug, Clone, Copy)]
enum Backend {
    OpenAI(OpenAIModel),
    Anthropic(AnthropicModel),
}

/// Model definition with metadata
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// User-facing model ID (e.g., "gpt-4o-mini")
    pub id: &'static str,
    pub provider: Provider,
    /// Human-readable description
    pub description: &'static str,
    /// Context window size in tokens
    pub context_window: usize,
    backend: Backend,
}

impl ModelDef {
    /// Name sent to the provider API
    pub fn api_name(&self) -> &'static str {
        match self.backend {
            Backend::OpenAI(m) => m.api_name(),
            Backend::Anthropic(m) => m.api_name(),
        }
    }

    /// Build the service for this model
    pub fn create_service(
        &self,
        api_key: &str,
        gateway: Option<&str>,
    ) -> Result<Arc<dyn LlmService>, LlmError> {
        if api_key.is_empty() {
            return Err(LlmError::auth(format!(
                "{} requires {} or a gateway",
                self.id,
                self.provider.api_key_env_var()
            )));
        }
        Ok(match self.backend {
            Backend::OpenAI(model) => {
                Arc::new(OpenAIService::new(api_key.to_string(), model, gateway)?)
            }
            Backend::Anthropic(model) => {
                Arc::new(AnthropicService::new(api_key.to_string(), model, gateway)?)
            }
        })
    }
}

/// Get all available model definitions
pub fn all_models() -> &'static [ModelDef] {
    &[
        ModelDef {
            id: "gpt-4o-mini",
            provider: Provider::OpenAI,
            description: "GPT-4o mini (fast, inexpensive)",
            context_window: 128_000,
            backend: Backend::OpenAI(OpenAIModel::GPT4oMini),
        },
        ModelDef {
            id: "gpt-4o",
            provider: Provider::OpenAI,
            description: "GPT-4o (general purpose)",
            context_window: 128_000,
            backend: Backend::OpenAI(OpenAIModel::GPT4o),
        },
        ModelDef {
            id: "gpt-4.1-mini",
            provider: Provider::OpenAI,
            description: "GPT-4.1 mini (long context)",
            context_window: 1_047_576,
            backend: Backend::OpenAI(OpenAIModel::GPT41Mini),
        },
        ModelDef {
            id: "claude-4.5-sonnet",
            provider: Provider::Anthropic,
            description: "Claude Sonnet 4.5 (balanced performance)",
            context_window: 200_000,
            backend: Backend::Anthropic(AnthropicModel::Claude45Sonnet),
        },
        ModelDef {
            id: "claude-4.5-haiku",
            provider: Provider::Anthropic,
            description: "Claude Haiku 4.5 (fast, efficient)",
            context_window: 200_000,
            backend: Backend::Anthropic(AnthropicModel::Claude45Haiku),
        },
    ]
}
