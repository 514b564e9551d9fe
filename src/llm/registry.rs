//! Model registry for managing available LLM providers

use super::{all_models, LlmService, LoggingService, ModelDef, Provider};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Preferred default chat model
const PREFERRED_DEFAULT: &str = "gpt-4o-mini";

/// Configuration for LLM providers
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    /// Gateway base URL; the gateway handles provider authentication
    pub gateway: Option<String>,
    /// Default model ID
    pub default_model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            gateway: std::env::var("LLM_GATEWAY").ok(),
            default_model: std::env::var("DEFAULT_MODEL").ok(),
        }
    }
}

/// Model information with metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    pub description: String,
    pub context_window: usize,
}

/// Registry of available LLM models
pub struct ModelRegistry {
    services: HashMap<String, Arc<dyn LlmService>>,
    default_model: String,
}

impl ModelRegistry {
    /// Create an empty registry for testing purposes
    pub fn new_empty() -> Self {
        Self {
            services: HashMap::new(),
            default_model: PREFERRED_DEFAULT.to_string(),
        }
    }

    pub fn new(config: &LlmConfig) -> Self {
        let mut services: HashMap<String, Arc<dyn LlmService>> = HashMap::new();

        for model_def in all_models() {
            if let Some(service) = Self::try_create_model(model_def, config) {
                services.insert(model_def.id.to_string(), service);
            }
        }

        let default_model = config
            .default_model
            .clone()
            .filter(|id| services.contains_key(id))
            .or_else(|| {
                if services.contains_key(PREFERRED_DEFAULT) {
                    Some(PREFERRED_DEFAULT.to_string())
                } else {
                    // Fall back to the first available model in definition order
                    all_models()
                        .iter()
                        .find(|m| services.contains_key(m.id))
                        .map(|m| m.id.to_string())
                }
            })
            .unwrap_or_else(|| PREFERRED_DEFAULT.to_string());

        if let Some(requested) = &config.default_model {
            if requested != &default_model {
                tracing::warn!(
                    requested = %requested,
                    using = %default_model,
                    "Requested default model is not available"
                );
            }
        }

        Self {
            services,
            default_model,
        }
    }

    fn try_create_model(model_def: &ModelDef, config: &LlmConfig) -> Option<Arc<dyn LlmService>> {
        // In gateway mode the gateway authenticates; any non-empty key will do
        let api_key = if config.gateway.is_some() {
            "implicit".to_string()
        } else {
            match model_def.provider {
                Provider::Anthropic => config.anthropic_api_key.as_ref()?,
                Provider::OpenAI => config.openai_api_key.as_ref()?,
            }
            .clone()
        };

        match model_def.create_service(&api_key, config.gateway.as_deref()) {
            Ok(service) => Some(Arc::new(LoggingService::new(service))),
            Err(e) => {
                tracing::debug!(model = model_def.id, error = %e, "Model unavailable");
                None
            }
        }
    }

    /// Register a service directly, replacing any existing one with the same ID
    pub fn with_service(mut self, service: Arc<dyn LlmService>) -> Self {
        let id = service.model_id().to_string();
        if self.services.is_empty() {
            self.default_model.clone_from(&id);
        }
        self.services.insert(id, service);
        self
    }

    pub fn get(&self, model_id: &str) -> Option<Arc<dyn LlmService>> {
        self.services.get(model_id).cloned()
    }

    pub fn default(&self) -> Option<Arc<dyn LlmService>> {
        self.get(&self.default_model)
    }

    pub fn default_model_id(&self) -> &str {
        &self.default_model
    }

    /// List all available model IDs
    pub fn available_models(&self) -> Vec<String> {
        let mut models: Vec<_> = self.services.keys().cloned().collect();
        models.sort();
        models
    }

    /// Get detailed information about available models
    pub fn available_model_info(&self) -> Vec<ModelInfo> {
        let mut infos: Vec<ModelInfo> = all_models()
            .iter()
            .filter(|m| self.services.contains_key(m.id))
            .map(|m| ModelInfo {
                id: m.id.to_string(),
                provider: m.provider.display_name().to_string(),
                description: m.description.to_string(),
                context_window: m.context_window,
            })
            .collect();

        // Directly registered services have no static definition
        for (id, service) in &self.services {
            if !infos.iter().any(|i| &i.id == id) {
                infos.push(ModelInfo {
                    id: id.clone(),
                    provider: "Custom".to_string(),
                    description: String::new(),
                    context_window: service.context_window(),
                });
            }
        }

        infos
    }

    pub fn has_models(&self) -> bool {
        !self.services.is_empty()
    }

    /// Get a cheap/fast model for auxiliary tasks like title generation.
    /// Prefers: gpt-4o-mini > claude-4.5-haiku > default model
    pub fn get_cheap_model(&self) -> Option<Arc<dyn LlmService>> {
        const CHEAP_MODELS: &[&str] = &["gpt-4o-mini", "claude-4.5-haiku"];

        CHEAP_MODELS
            .iter()
            .find_map(|id| self.get(id))
            .or_else(|| self.default())
    }
}
