//! Custom error types for the chat backend
//!
//! Each layer has its own enum; the agent error wraps everything that can
//! end a turn early.

use thiserror::Error;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Market-data provider errors
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("HTTP {status} for {ticker}: {body}")]
    Http {
        ticker: String,
        status: u16,
        body: String,
    },

    #[error("Rate limited by market-data provider for {ticker}")]
    RateLimited { ticker: String },

    #[error("No data found for {ticker}: {reason}")]
    NotFound { ticker: String, reason: String },

    #[error("Invalid date {value}: expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("Unexpected payload for {ticker}: {reason}")]
    Payload { ticker: String, reason: String },

    #[error("Market-data provider failed for {ticker}: {reason}")]
    Provider { ticker: String, reason: String },

    #[error("Failed to initialise market-data connector: {0}")]
    Connector(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Tool dispatch and execution errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Invalid arguments for {name}: {source}")]
    InvalidArguments {
        name: String,
        source: serde_json::Error,
    },

    #[error("Tool {name} failed: {source}")]
    Execution {
        name: String,
        source: MarketDataError,
    },
}

/// Chat-completion provider errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("OpenAI API error: {0}")]
    Api(#[from] async_openai::error::OpenAIError),

    #[error("Malformed stream: {0}")]
    Stream(String),
}

/// Conversation-state store errors
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint backend unavailable: {0}")]
    Backend(String),
}

/// Errors that end an agent turn
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("Exceeded {max_rounds} model round-trips without a final answer")]
    TooManyRounds { max_rounds: usize },

    #[error("Client disconnected")]
    Disconnected,
}
