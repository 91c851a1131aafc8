use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::UserId;

/// A single vector-store record produced by indexing one turn (spec.md
/// §4.6). Embedding computation itself is out of scope (Non-goals); this
/// is the write-through payload a real indexer would embed and persist.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub chat_id: String,
    pub user_id: UserId,
    pub role: crate::types::Role,
    pub text: String,
    pub chat_title: String,
    pub timestamp_millis: u64,
}

/// Write-through sink for indexed turns.
///
/// Grounded on `adk-session::SessionService`'s shape: an injected trait an
/// in-memory test double can implement, with the real backend out of
/// scope per the Non-goals.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add_record(&self, record: VectorRecord) -> Result<()>;
}

/// Write-through sink for a chat's message history.
///
/// `add_message` mirrors `VectorIndexer`'s use of an injected store to
/// persist each turn it indexes (spec.md §4.6), independent of whatever
/// normalizes history for the next request (C3).
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn add_message(&self, chat_id: &str, role: crate::types::Role, content: &str) -> Result<()>;

    /// Best-effort close, given a deadline (spec.md §4.8 step 4: each
    /// store gets its own sub-deadline during shutdown).
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A `ChatStore` that persists nothing. Chat-history persistence is out of
/// scope (spec.md Non-goals); this satisfies the shutdown sequence's
/// `closeDatabase()` step for deployments that don't wire in a real store.
pub struct NullChatStore;

#[async_trait]
impl ChatStore for NullChatStore {
    async fn add_message(&self, _chat_id: &str, _role: crate::types::Role, _content: &str) -> Result<()> {
        Ok(())
    }
}

/// A tool the upstream connector can invoke on the model's behalf, in
/// response to a `functionCall` part (spec.md §4.5).
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Name as it appears in `functionCall.name`.
    fn name(&self) -> &str;

    async fn call(&self, arguments: Value) -> Result<Value>;
}
