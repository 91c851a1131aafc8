use serde::{Deserialize, Serialize};

/// Events emitted to one client connection for one `chatId` (spec.md §6).
///
/// Grounded on the teacher's `adk_core::Event` tagged-union style: a flat
/// enum the server crate serializes directly onto a WebSocket frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundEvent {
    #[serde(rename_all = "camelCase")]
    Typing {
        chat_id: String,
        is_typing: bool,
    },
    #[serde(rename_all = "camelCase")]
    RateLimitInfo {
        remaining: Window,
        limit: Window,
        reset_at: WindowTimestamps,
    },
    #[serde(rename_all = "camelCase")]
    MessageResponse {
        chat_id: String,
        message: String,
        is_complete: bool,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        rate_limited: bool,
    },
    #[serde(rename_all = "camelCase")]
    DebugInfo {
        kind: DebugInfoKind,
        chat_id: String,
        timestamp_millis: u64,
        detail: serde_json::Value,
    },
}

/// Per-window token counts, matching spec.md §6's nested `remaining`/`limit`
/// shape (`{minute, hour}`) rather than flattened scalar fields.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Window {
    pub minute: u32,
    pub hour: u32,
}

/// Absolute reset timestamps (ms since epoch) for the two windows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowTimestamps {
    pub minute: u64,
    pub hour: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugInfoKind {
    Request,
    Response,
}

impl OutboundEvent {
    pub fn message_chunk(chat_id: impl Into<String>, chunk: impl Into<String>) -> Self {
        OutboundEvent::MessageResponse { chat_id: chat_id.into(), message: chunk.into(), is_complete: false, rate_limited: false }
    }

    pub fn terminal(chat_id: impl Into<String>, message: impl Into<String>) -> Self {
        OutboundEvent::MessageResponse { chat_id: chat_id.into(), message: message.into(), is_complete: true, rate_limited: false }
    }

    pub fn terminal_rate_limited(chat_id: impl Into<String>, message: impl Into<String>) -> Self {
        OutboundEvent::MessageResponse { chat_id: chat_id.into(), message: message.into(), is_complete: true, rate_limited: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_event_uses_camel_case_fields() {
        let event = OutboundEvent::Typing { chat_id: "c1".to_string(), is_typing: true };
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "typing");
        assert_eq!(value["chatId"], "c1");
        assert_eq!(value["isTyping"], true);
    }

    #[test]
    fn rate_limit_info_nests_remaining_limit_and_reset_at() {
        let event = OutboundEvent::RateLimitInfo {
            remaining: Window { minute: 59, hour: 499 },
            limit: Window { minute: 60, hour: 500 },
            reset_at: WindowTimestamps { minute: 60_000, hour: 3_600_000 },
        };
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "rate-limit-info");
        assert_eq!(value["remaining"]["minute"], 59);
        assert_eq!(value["remaining"]["hour"], 499);
        assert_eq!(value["limit"]["minute"], 60);
        assert_eq!(value["resetAt"]["hour"], 3_600_000);
    }

    #[test]
    fn message_response_chunk_uses_camel_case_and_omits_rate_limited() {
        let event = OutboundEvent::message_chunk("c1", "he");
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "message-response");
        assert_eq!(value["chatId"], "c1");
        assert_eq!(value["isComplete"], false);
        assert!(value.get("rateLimited").is_none());
    }

    #[test]
    fn terminal_rate_limited_sets_rate_limited_true() {
        let event = OutboundEvent::terminal_rate_limited("c1", "slow down");
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["isComplete"], true);
        assert_eq!(value["rateLimited"], true);
    }
}
