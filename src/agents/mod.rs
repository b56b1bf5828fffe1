pub mod checkpoint;


use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

use crate::error::{AgentError, ToolError};
use crate::llm::{ChatMessage, ChatModel, ModelEvent};
use crate::tools::ToolRegistry;

pub use checkpoint::{CheckpointStore, InMemoryCheckpointStore};

/// Per-run options.
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Conversation scope for checkpointed history.
    pub thread_id: String,
}

/// Tokens in emission order; an `Err` is always the final item.
pub type AgentStream = ReceiverStream<Result<String, AgentError>>;

/// Tool-calling chat agent.
///
/// Each turn streams the model, runs any tools it asks for, feeds the
/// results back and repeats until the model answers without tool calls.
pub struct ChatAgent {
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    checkpoints: Arc<dyn CheckpointStore>,
    max_rounds: usize,
    stream_buffer: usize,
}

impl ChatAgent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: ToolRegistry,
        checkpoints: Arc<dyn CheckpointStore>,
        max_rounds: usize,
        stream_buffer: usize,
    ) -> Self {
        Self {
            model,
            tools,
            checkpoints,
            max_rounds: max_rounds.max(1),
            stream_buffer: stream_buffer.max(1),
        }
    }

    /// Start a turn in the background and return its token stream.
    ///
    /// Dropping the stream cancels the turn: every wait on the model or a
    /// tool is abandoned once the receiver is gone, and nothing is
    /// checkpointed.
    pub fn stream(self: &Arc<Self>, messages: Vec<ChatMessage>, options: RunOptions) -> AgentStream {
        let (tx, rx) = mpsc::channel(self.stream_buffer);
        let agent = Arc::clone(self);

        tokio::spawn(async move {
            match agent.run(messages, &options, &tx).await {
                Ok(()) => info!("🤖 [AGENT] Turn complete (thread: {})", options.thread_id),
                Err(AgentError::Disconnected) => {
                    warn!("🤖 [AGENT] Client went away (thread: {})", options.thread_id)
                }
                Err(e) => {
                    error!("🤖 [AGENT] Turn failed (thread: {}): {}", options.thread_id, e);
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        ReceiverStream::new(rx)
    }

    /// Run one turn, sending every text fragment to `tx` as it arrives.
    ///
    /// System messages in `messages` lead every model request; the rest are
    /// the new input for this turn and are checkpointed with the reply.
    pub async fn run(
        &self,
        messages: Vec<ChatMessage>,
        options: &RunOptions,
        tx: &mpsc::Sender<Result<String, AgentError>>,
    ) -> Result<(), AgentError> {
        let (system, mut turn): (Vec<_>, Vec<_>) =
            messages.into_iter().partition(ChatMessage::is_system);
        let history = self.checkpoints.load(&options.thread_id).await?;
        let specs = self.tools.specs();

        info!(
            "🤖 [AGENT] Starting turn (thread: {}, history: {} messages)",
            options.thread_id,
            history.len()
        );

        for round in 1..=self.max_rounds {
            let context: Vec<ChatMessage> = system
                .iter()
                .chain(history.iter())
                .chain(turn.iter())
                .cloned()
                .collect();

            let mut stream = tokio::select! {
                _ = tx.closed() => return Err(AgentError::Disconnected),
                opened = self.model.stream(&context, &specs) => opened?,
            };
            let mut text = String::new();
            let mut calls = Vec::new();

            loop {
                let event = tokio::select! {
                    _ = tx.closed() => return Err(AgentError::Disconnected),
                    event = stream.next() => event,
                };
                let Some(event) = event else { break };

                match event? {
                    ModelEvent::Token(token) => {
                        text.push_str(&token);
                        tx.send(Ok(token))
                            .await
                            .map_err(|_| AgentError::Disconnected)?;
                    }
                    ModelEvent::ToolCall(call) => calls.push(call),
                }
            }

            let content = (!text.is_empty()).then_some(text);
            if calls.is_empty() {
                turn.push(ChatMessage::Assistant {
                    content,
                    tool_calls: Vec::new(),
                });
                self.checkpoints.append(&options.thread_id, turn).await?;
                return Ok(());
            }

            info!(
                "🤖 [AGENT] Round {}: model requested {} tool call(s)",
                round,
                calls.len()
            );
            turn.push(ChatMessage::Assistant {
                content,
                tool_calls: calls.clone(),
            });

            for call in calls {
                let outcome = tokio::select! {
                    _ = tx.closed() => return Err(AgentError::Disconnected),
                    outcome = self.tools.dispatch(&call.name, &call.arguments) => outcome,
                };
                let content = match outcome {
                    Ok(result) => result.to_string(),
                    // The model can correct a bad tool name or argument object
                    Err(e @ (ToolError::UnknownTool { .. } | ToolError::InvalidArguments { .. })) => {
                        warn!("🔧 [TOOL] Returning error to model: {}", e);
                        format!("Error: {e}\n Please fix your mistakes.")
                    }
                    Err(e) => return Err(e.into()),
                };
                turn.push(ChatMessage::Tool {
                    tool_call_id: call.id,
                    content,
                });
            }
        }

        Err(AgentError::TooManyRounds {
            max_rounds: self.max_rounds,
        })
    }
}
