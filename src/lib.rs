//! Chat relay - streaming LLM chat server and client
//!
//! A Rust backend that relays provider token streams to clients as
//! server-sent events and persists conversation history.

pub mod api;
pub mod client;
pub mod db;
pub mod llm;
pub mod orchestrator;
pub mod relay;
pub mod title;
pub mod wire;
