pub mod openai;
pub mod tool_calls;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::LlmError;
use crate::tools::ToolSpec;

pub use openai::LLMClient;
pub use tool_calls::ToolCallAccumulator;

/// A tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON argument string as produced by the model.
    pub arguments: String,
}

/// Provider-neutral conversation message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage::User {
            content: content.into(),
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, ChatMessage::System { .. })
    }
}

/// One item of a streamed completion.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelEvent {
    /// A text fragment, forwarded to the caller verbatim.
    Token(String),
    /// A fully assembled tool call; emitted after the text of the same round.
    ToolCall(ToolCall),
}

pub type ModelStream = Pin<Box<dyn Stream<Item = Result<ModelEvent, LlmError>> + Send>>;

/// Streaming chat-completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelStream, LlmError>;
}
