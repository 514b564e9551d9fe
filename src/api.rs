//! HTTP API for the chat relay

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
pub use types::*;

use crate::db::Database;
use crate::llm::ModelRegistry;
use crate::relay::{RelayConfig, StreamRelay};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// `None` when no model is configured; sending messages is then unavailable
    pub relay: Option<Arc<StreamRelay>>,
    pub llm_registry: Arc<ModelRegistry>,
}

impl AppState {
    pub fn new(db: Database, llm_registry: Arc<ModelRegistry>, config: RelayConfig) -> Self {
        let relay = llm_registry.default().map(|chat_llm| {
            let mut relay = StreamRelay::new(Arc::new(db.clone()), chat_llm, config);
            if let Some(title_llm) = llm_registry.get_cheap_model() {
                relay = relay.with_title_llm(title_llm);
            }
            Arc::new(relay)
        });

        Self {
            db,
            relay,
            llm_registry,
        }
    }
}
