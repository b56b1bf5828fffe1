//! Stock Chat - streaming stock-analysis chat backend
//!
//! This library wires a tool-calling LLM agent to Yahoo Finance lookups and
//! exposes it as a streaming HTTP endpoint.

pub mod agents;
pub mod api;
pub mod config;
pub mod constants;
pub mod data;
pub mod error;
pub mod llm;
pub mod request;
pub mod test_utils;
pub mod tools;

// Re-export commonly used types
pub use agents::{ChatAgent, CheckpointStore, InMemoryCheckpointStore, RunOptions};
pub use api::{build_router, AppState};
pub use config::AppConfig;
pub use llm::{ChatMessage, ChatModel, LLMClient};
pub use request::ChatRequest;
pub use tools::ToolRegistry;

#[cfg(test)]
mod config_tests;
