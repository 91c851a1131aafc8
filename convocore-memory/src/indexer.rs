use std::sync::Arc;

use convocore_core::clock::{Clock, SystemClock};
use convocore_core::stores::{VectorRecord, VectorStore};
use convocore_core::types::{Role, StoredContent, StoredTurn};
use convocore_core::UserId;

const CHAT_TITLE_MAX_CHARS: usize = 50;
const DEFAULT_CHAT_TITLE: &str = "New Chat";

/// Write-through of a completed turn to the retrieval store (spec.md
/// §4.6). Indexing never fails the pipeline: every store error is caught
/// and logged.
pub struct VectorIndexer {
    store: Arc<dyn VectorStore>,
    clock: Arc<dyn Clock>,
}

impl VectorIndexer {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn VectorStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn index_turn(
        &self,
        user_id: &UserId,
        chat_id: &str,
        user_text: &str,
        assistant_text: &str,
        history_snapshot: &[StoredTurn],
    ) {
        let title = chat_title(history_snapshot);

        let user_record = VectorRecord {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            user_id: user_id.clone(),
            role: Role::User,
            text: user_text.to_string(),
            chat_title: title.clone(),
            timestamp_millis: self.clock.now_millis(),
        };
        let assistant_record = VectorRecord {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            user_id: user_id.clone(),
            role: Role::Model,
            text: assistant_text.to_string(),
            chat_title: title,
            timestamp_millis: self.clock.now_millis(),
        };

        let (user_result, assistant_result) =
            tokio::join!(self.store.add_record(user_record), self.store.add_record(assistant_record));

        if let Err(err) = user_result {
            tracing::error!(chat_id, error = %err, "failed to index user turn");
        }
        if let Err(err) = assistant_result {
            tracing::error!(chat_id, error = %err, "failed to index assistant turn");
        }
    }
}

/// First 50 characters of the first user turn in `history_snapshot`, or a
/// default title when none is found.
fn chat_title(history_snapshot: &[StoredTurn]) -> String {
    history_snapshot
        .iter()
        .find(|turn| matches!(turn.role, convocore_core::types::StoredRole::User))
        .map(|turn| match &turn.content {
            StoredContent::Text(text) => text.clone(),
            StoredContent::Object(value) => value.to_string(),
        })
        .map(|text| text.chars().take(CHAT_TITLE_MAX_CHARS).collect())
        .unwrap_or_else(|| DEFAULT_CHAT_TITLE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use convocore_core::clock::test_support::ManualClock;
    use std::sync::Mutex;

    struct RecordingStore {
        records: Mutex<Vec<VectorRecord>>,
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        async fn add_record(&self, record: VectorRecord) -> convocore_core::Result<()> {
            self.records.lock().unwrap().push(record);
            Ok(())
        }
    }

    #[tokio::test]
    async fn indexes_both_roles_with_a_shared_title() {
        let store = Arc::new(RecordingStore { records: Mutex::new(Vec::new()) });
        let indexer = VectorIndexer::with_clock(store.clone(), Arc::new(ManualClock::new(1_000)));
        let history = vec![StoredTurn {
            role: convocore_core::types::StoredRole::User,
            content: StoredContent::Text("what's the weather like today in Boston?".to_string()),
            attachments: vec![],
        }];

        indexer.index_turn(&UserId::parse("u1").unwrap(), "c1", "hi", "hello", &history).await;

        let records = store.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].role, Role::User);
        assert_eq!(records[1].role, Role::Model);
        assert_eq!(records[0].chat_title, "what's the weather like today in Boston?");
        assert_ne!(records[0].id, records[1].id);
    }

    #[test]
    fn default_title_when_no_user_turn() {
        assert_eq!(chat_title(&[]), DEFAULT_CHAT_TITLE);
    }
}
