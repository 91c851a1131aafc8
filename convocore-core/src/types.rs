use derive_more::{AsRef, Deref, Display, From, Into};
use serde::{Deserialize, Serialize};

/// Opaque, non-empty identity used as the rate-limit and ownership key.
///
/// Validity (non-empty) is enforced by [`UserId::parse`], not by this
/// newtype's constructors — `From<String>` stays infallible so callers can
/// build one from a trusted source, while untrusted input goes through
/// `parse`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, AsRef, Deref, Into, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Validates an inbound user id per spec.md §4.1 step 1: non-empty string.
    pub fn parse(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }
}

/// Kind of attachment as classified from its declared MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Document,
    Text,
    Unknown,
}

impl AttachmentKind {
    pub fn classify(mime: &str) -> Self {
        if mime.starts_with("image/") {
            AttachmentKind::Image
        } else if mime == "application/pdf"
            || mime == "application/msword"
            || mime == "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        {
            AttachmentKind::Document
        } else if mime.starts_with("text/") {
            AttachmentKind::Text
        } else {
            AttachmentKind::Unknown
        }
    }
}

/// An inbound attachment, or one rehydrated from stored history.
///
/// Ephemeral: lives only for the duration of one pipeline invocation
/// (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub kind: AttachmentKind,
    pub declared_mime: String,
    /// Base64-encoded payload, as received on the wire.
    pub payload: String,
}

impl Attachment {
    /// True binary size accounting for `=` padding, per spec.md §8.
    ///
    /// `binary_size(base64Encode(bytes)) == len(bytes)` for every byte
    /// sequence, regardless of `len(bytes) % 3`.
    pub fn binary_size(&self) -> usize {
        binary_size_of_base64(&self.payload)
    }
}

/// Computes the decoded byte length of a base64 string without decoding it.
pub fn binary_size_of_base64(encoded: &str) -> usize {
    let encoded = encoded.trim_end();
    let len = encoded.len();
    if len == 0 {
        return 0;
    }
    let padding = encoded.chars().rev().take_while(|&c| c == '=').count();
    (len / 4) * 3 - padding.min(2)
}

/// One element of a provider-bound message, ordered per turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessagePart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    InlineData {
        inline_data: InlineData,
    },
    #[serde(rename_all = "camelCase")]
    FunctionResponse {
        function_response: FunctionResponsePart,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineData {
    pub mime: String,
    pub base64_data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponsePart {
    pub name: String,
    pub result: String,
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        MessagePart::Text { text: text.into() }
    }

    pub fn inline_data(mime: impl Into<String>, base64_data: impl Into<String>) -> Self {
        MessagePart::InlineData {
            inline_data: InlineData { mime: mime.into(), base64_data: base64_data.into() },
        }
    }

    pub fn function_response(name: impl Into<String>, result: impl Into<String>) -> Self {
        MessagePart::FunctionResponse {
            function_response: FunctionResponsePart { name: name.into(), result: result.into() },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessagePart::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Role of a normalized, provider-bound turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// Role as it appears in the external history store, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredRole {
    User,
    Assistant,
}

impl From<StoredRole> for Role {
    fn from(role: StoredRole) -> Self {
        match role {
            StoredRole::User => Role::User,
            StoredRole::Assistant => Role::Model,
        }
    }
}

/// Content as consumed from the external history store: either a plain
/// string or an arbitrary JSON object that must be coerced (spec.md §4.3,
/// §9 "stored content may arrive as a non-string").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredContent {
    Text(String),
    Object(serde_json::Value),
}

/// One turn as consumed from the external history store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTurn {
    pub role: StoredRole,
    pub content: StoredContent,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// A normalized, provider-bound turn produced by the history normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedTurn {
    pub role: Role,
    pub parts: Vec<MessagePart>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_rejects_empty() {
        assert!(UserId::parse("").is_none());
        assert!(UserId::parse("   ").is_none());
        assert!(UserId::parse("u1").is_some());
    }

    #[test]
    fn binary_size_matches_every_padding_case() {
        // len % 3 == 0: no padding
        let b0 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b"abc");
        assert_eq!(binary_size_of_base64(&b0), 3);
        // len % 3 == 1: two '=' padding chars
        let b1 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b"ab");
        assert_eq!(binary_size_of_base64(&b1), 2);
        // len % 3 == 2: one '=' padding char
        let b2 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b"a");
        assert_eq!(binary_size_of_base64(&b2), 1);
    }

    #[test]
    fn attachment_kind_classification() {
        assert_eq!(AttachmentKind::classify("image/png"), AttachmentKind::Image);
        assert_eq!(AttachmentKind::classify("application/pdf"), AttachmentKind::Document);
        assert_eq!(AttachmentKind::classify("text/plain"), AttachmentKind::Text);
        assert_eq!(AttachmentKind::classify("application/octet-stream"), AttachmentKind::Unknown);
    }
}
