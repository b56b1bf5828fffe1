use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::CheckpointError;
use crate::llm::ChatMessage;

/// Per-thread conversation history.
///
/// Writes are appends so two turns on the same thread never drop each
/// other's messages, though their order may interleave.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// History for `thread_id`, oldest first. Unknown threads are empty.
    async fn load(&self, thread_id: &str) -> Result<Vec<ChatMessage>, CheckpointError>;

    async fn append(
        &self,
        thread_id: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<(), CheckpointError>;
}

/// Process-lifetime store; everything is lost on restart.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    threads: DashMap<String, Vec<ChatMessage>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Vec<ChatMessage>, CheckpointError> {
        Ok(self
            .threads
            .get(thread_id)
            .map(|history| history.clone())
            .unwrap_or_default())
    }

    async fn append(
        &self,
        thread_id: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<(), CheckpointError> {
        self.threads
            .entry(thread_id.to_string())
            .or_default()
            .extend(messages);
        Ok(())
    }
}
