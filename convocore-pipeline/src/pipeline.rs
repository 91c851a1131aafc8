use std::sync::Arc;

use convocore_attachments::AttachmentProcessor;
use convocore_core::events::{OutboundEvent, Window, WindowTimestamps};
use convocore_core::types::{Attachment, MessagePart, StoredTurn, UserId};
use convocore_history::HistoryNormalizer;
use convocore_memory::VectorIndexer;
use convocore_ratelimit::{Decision, RateLimiter};
use convocore_upstream::{SendContext, UpstreamConnector};
use tokio::sync::mpsc::Sender;

/// One inbound client message (spec.md §4.7 `request`).
pub struct PipelineRequest {
    pub message: String,
    pub chat_history: Vec<StoredTurn>,
    pub chat_id: String,
    pub attachments: Vec<Attachment>,
    pub user_id: String,
    pub credential: Option<String>,
}

/// Composes C1–C6 for one inbound message, emitting the ordered event
/// sequence a connection expects (spec.md §4.7).
pub struct Pipeline {
    rate_limiter: Arc<RateLimiter>,
    normalizer: Arc<HistoryNormalizer>,
    processor: Arc<AttachmentProcessor>,
    connector: Arc<UpstreamConnector>,
    indexer: Arc<VectorIndexer>,
    system_preamble: Vec<Vec<MessagePart>>,
}

impl Pipeline {
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        normalizer: Arc<HistoryNormalizer>,
        processor: Arc<AttachmentProcessor>,
        connector: Arc<UpstreamConnector>,
        indexer: Arc<VectorIndexer>,
        system_preamble: Vec<Vec<MessagePart>>,
    ) -> Self {
        Self { rate_limiter, normalizer, processor, connector, indexer, system_preamble }
    }

    /// Runs the ordered steps of spec.md §4.7. `typing{false}` is always
    /// emitted before returning, whether the turn completed, was rate
    /// limited, or the connector failed partway through.
    pub async fn process(&self, events: &Sender<OutboundEvent>, request: PipelineRequest) {
        let decision = self.rate_limiter.check_limit(&request.user_id);
        let _ = events.send(rate_limit_info_event(&decision)).await;

        if !decision.allowed {
            let message = wait_message(decision.retry_after_ms);
            let _ = events.send(OutboundEvent::terminal_rate_limited(&request.chat_id, message)).await;
            return;
        }

        let _ = events.send(OutboundEvent::Typing { chat_id: request.chat_id.clone(), is_typing: true }).await;
        self.run_turn(events, &request).await;
        let _ = events.send(OutboundEvent::Typing { chat_id: request.chat_id.clone(), is_typing: false }).await;
    }

    async fn run_turn(&self, events: &Sender<OutboundEvent>, request: &PipelineRequest) {
        let Some(user_id) = UserId::parse(request.user_id.clone()) else {
            // Already validated by check_limit above; defensive only.
            return;
        };

        let normalized = self.normalizer.normalize(&request.chat_history, &self.system_preamble);
        let outcome = self.processor.process(&request.attachments, &request.message).await;

        let context = SendContext { user_id: user_id.clone(), credential: request.credential.clone() };
        let result = self
            .connector
            .send_message(events, &request.chat_id, &normalized, &outcome.parts, &context)
            .await;

        if !result.text.is_empty() && !result.blocked && !result.timed_out {
            self.indexer
                .index_turn(&user_id, &request.chat_id, &request.message, &result.text, &request.chat_history)
                .await;
        }
    }
}

fn rate_limit_info_event(decision: &Decision) -> OutboundEvent {
    OutboundEvent::RateLimitInfo {
        remaining: Window { minute: decision.remaining.minute, hour: decision.remaining.hour },
        limit: Window { minute: decision.limit.minute, hour: decision.limit.hour },
        reset_at: WindowTimestamps { minute: decision.reset_at.minute, hour: decision.reset_at.hour },
    }
}

fn wait_message(retry_after_ms: u64) -> String {
    let seconds = retry_after_ms.div_ceil(1000).max(1);
    if seconds == 1 {
        "You're sending messages too quickly. Please wait a second and try again.".to_string()
    } else {
        format!("You're sending messages too quickly. Please wait {seconds} seconds and try again.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_message_is_grammatical_for_one_second() {
        assert!(wait_message(900).contains("a second"));
    }

    #[test]
    fn wait_message_rounds_up() {
        assert!(wait_message(1500).contains("2 seconds"));
    }

    mod process_ordering {
        use super::*;
        use convocore_attachments::{AttachmentPolicy, AttachmentProcessor, NullExtractor};
        use convocore_memory::{InMemoryVectorStore, VectorIndexer};
        use convocore_ratelimit::{RateLimiter, RateLimiterConfig};
        use convocore_upstream::gemini::GeminiClient;
        use convocore_upstream::CredentialCache;
        use std::collections::HashMap;
        use std::time::Duration;
        use tokio::sync::mpsc;
        use wiremock::matchers::{method, path_regex};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        async fn build_pipeline(server: &MockServer) -> (Pipeline, Arc<InMemoryVectorStore>) {
            let base_url = url::Url::parse(&server.uri()).unwrap().join("/v1beta/").unwrap();
            let client = GeminiClient::with_base_url("AIzatestkeytestkeytestkeytestkeytest", "gemini-2.5-flash", base_url).unwrap();
            let credentials = Arc::new(CredentialCache::new(Arc::new(client), "gemini-2.5-flash"));
            let tools: Arc<HashMap<String, Arc<dyn convocore_core::ToolHandler>>> = Arc::new(HashMap::new());
            let connector = Arc::new(UpstreamConnector::new(credentials, tools));

            let store = Arc::new(InMemoryVectorStore::new());
            let indexer = Arc::new(VectorIndexer::new(store.clone()));

            let rate_limiter = RateLimiter::new(RateLimiterConfig::default());
            let normalizer = Arc::new(HistoryNormalizer::new(AttachmentPolicy::default()));
            let processor = Arc::new(AttachmentProcessor::new(AttachmentPolicy::default(), Arc::new(NullExtractor)));

            (Pipeline::new(rate_limiter, normalizer, processor, connector, indexer, Vec::new()), store)
        }

        fn request() -> PipelineRequest {
            PipelineRequest {
                message: "hi".to_string(),
                chat_history: Vec::new(),
                chat_id: "c1".to_string(),
                attachments: Vec::new(),
                user_id: "u1".to_string(),
                credential: None,
            }
        }

        /// Scenario 1: a clean turn emits `rate-limit-info` → `typing{true}`
        /// → streamed chunks → a terminal `isComplete:true` → `typing{false}`,
        /// in that order, and the completed turn gets indexed.
        #[tokio::test]
        async fn clean_turn_emits_events_in_order_and_indexes() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path_regex(r".*:streamGenerateContent"))
                .respond_with(ResponseTemplate::new(200).set_body_string(
                    "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"he\"}]},\"finishReason\":\"STOP\"}]}\n\n",
                ))
                .mount(&server)
                .await;

            let (pipeline, store) = build_pipeline(&server).await;
            let (tx, mut rx) = mpsc::channel(32);
            pipeline.process(&tx, request()).await;
            drop(tx);

            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }

            assert!(matches!(events[0], OutboundEvent::RateLimitInfo { .. }));
            assert!(matches!(events[1], OutboundEvent::Typing { is_typing: true, .. }));
            assert!(matches!(
                events[2],
                OutboundEvent::MessageResponse { ref message, is_complete: false, .. } if message == "he"
            ));
            assert!(matches!(
                events[3],
                OutboundEvent::MessageResponse { is_complete: true, rate_limited: false, .. }
            ));
            assert!(matches!(events[4], OutboundEvent::Typing { is_typing: false, .. }));
            assert_eq!(events.len(), 5);

            assert_eq!(store.records_for_chat("c1").len(), 2);
        }

        /// Scenario 6: an upstream call that never resolves within
        /// `API_TIMEOUT` still ends the turn with `typing{false}`, and
        /// nothing gets indexed.
        #[tokio::test(start_paused = true)]
        async fn upstream_timeout_ends_with_typing_false_and_no_indexing() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path_regex(r".*:streamGenerateContent"))
                .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(120)).set_body_string("data: {}\n\n"))
                .mount(&server)
                .await;

            let (pipeline, store) = build_pipeline(&server).await;
            let (tx, mut rx) = mpsc::channel(32);
            pipeline.process(&tx, request()).await;
            drop(tx);

            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }

            let last = events.last().unwrap();
            assert!(matches!(last, OutboundEvent::Typing { is_typing: false, .. }));
            let terminal = &events[events.len() - 2];
            assert!(matches!(terminal, OutboundEvent::MessageResponse { is_complete: true, .. }));

            assert!(store.records_for_chat("c1").is_empty());
        }
    }
}
