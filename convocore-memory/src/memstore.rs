use std::sync::Mutex;

use async_trait::async_trait;
use convocore_core::stores::{VectorRecord, VectorStore};
use convocore_core::Result;

/// An in-memory [`VectorStore`] that keeps every record in process
/// memory. A real embedding index (pgvector or similar) is explicitly out
/// of scope for this core (spec.md Non-goals: "the indexing/retrieval
/// algorithm of the vector store beyond a write-through interface");
/// this is the stub the server crate wires in by default.
#[derive(Default)]
pub struct InMemoryVectorStore {
    records: Mutex<Vec<VectorRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records_for_chat(&self, chat_id: &str) -> Vec<VectorRecord> {
        self.records.lock().unwrap().iter().filter(|r| r.chat_id == chat_id).cloned().collect()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add_record(&self, record: VectorRecord) -> Result<()> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convocore_core::types::Role;
    use convocore_core::UserId;

    #[tokio::test]
    async fn records_are_filterable_by_chat() {
        let store = InMemoryVectorStore::new();
        store
            .add_record(VectorRecord {
                id: "1".to_string(),
                chat_id: "c1".to_string(),
                user_id: UserId::parse("u1").unwrap(),
                role: Role::User,
                text: "hi".to_string(),
                chat_title: "New Chat".to_string(),
                timestamp_millis: 0,
            })
            .await
            .unwrap();
        assert_eq!(store.records_for_chat("c1").len(), 1);
        assert_eq!(store.records_for_chat("c2").len(), 0);
    }
}
