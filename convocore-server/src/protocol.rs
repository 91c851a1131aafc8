use convocore_core::types::{Attachment, StoredTurn};
use serde::Deserialize;

/// Wire shape of one inbound message (spec.md §6 "Inbound event").
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub message: String,
    #[serde(default)]
    pub chat_history: Vec<StoredTurn>,
    pub chat_id: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub user_id: String,
    #[serde(default)]
    pub credential: Option<String>,
}

impl From<InboundMessage> for convocore_pipeline::PipelineRequest {
    fn from(inbound: InboundMessage) -> Self {
        convocore_pipeline::PipelineRequest {
            message: inbound.message,
            chat_history: inbound.chat_history,
            chat_id: inbound.chat_id,
            attachments: inbound.attachments,
            user_id: inbound.user_id,
            credential: inbound.credential,
        }
    }
}
