use base64::Engine;
use convocore_attachments::{magic, AttachmentPolicy};
use convocore_core::types::{AttachmentKind, MessagePart, NormalizedTurn, Role, StoredContent, StoredRole, StoredTurn};

/// Converts stored history into provider-bound turns (spec.md §4.3).
///
/// Re-runs the size/magic-byte checks from [`convocore_attachments`] on
/// embedded images so a compromised history store cannot smuggle an
/// oversized or mistyped attachment into a replayed turn; dimensions are
/// trusted to have been validated at ingestion.
pub struct HistoryNormalizer {
    policy: AttachmentPolicy,
}

impl HistoryNormalizer {
    pub fn new(policy: AttachmentPolicy) -> Self {
        Self { policy }
    }

    /// `system_preamble` is prefixed as fixed `model`-role turns, supplied
    /// by the caller rather than hidden inside the normalizer.
    pub fn normalize(&self, stored: &[StoredTurn], system_preamble: &[Vec<MessagePart>]) -> Vec<NormalizedTurn> {
        let mut turns: Vec<NormalizedTurn> = system_preamble
            .iter()
            .map(|parts| NormalizedTurn { role: Role::Model, parts: parts.clone() })
            .collect();

        for stored_turn in stored {
            turns.push(self.normalize_one(stored_turn));
        }
        turns
    }

    fn normalize_one(&self, stored: &StoredTurn) -> NormalizedTurn {
        let clean = coerce_content(&stored.content);
        let mut parts = vec![MessagePart::text(clean)];

        for attachment in &stored.attachments {
            if attachment.kind != AttachmentKind::Image {
                continue;
            }
            match self.revalidate_image(attachment) {
                Some(part) => parts.push(part),
                None => {
                    tracing::info!(name = %attachment.name, "dropped rehydrated image that failed re-validation");
                }
            }
        }

        let role = match stored.role {
            StoredRole::User => Role::User,
            StoredRole::Assistant => Role::Model,
        };
        NormalizedTurn { role, parts }
    }

    fn revalidate_image(&self, attachment: &convocore_core::types::Attachment) -> Option<MessagePart> {
        let decoded = base64::engine::general_purpose::STANDARD.decode(attachment.payload.trim()).ok()?;
        if decoded.len() > self.policy.max_image_bytes {
            return None;
        }
        if let Some(false) = magic::check(&attachment.declared_mime, &decoded) {
            return None;
        }
        Some(MessagePart::inline_data(attachment.declared_mime.clone(), attachment.payload.clone()))
    }
}

/// Coerces `StoredTurn.content` to a clean string (spec.md §4.3 step 1 /
/// §9 "stored content may arrive as a non-string").
fn coerce_content(content: &StoredContent) -> String {
    let value = match content {
        StoredContent::Text(text) => return coerce_finish(text.clone(), None),
        StoredContent::Object(value) => value.clone(),
    };

    let text_field = value.get("text").and_then(|v| v.as_str()).map(str::to_string);
    let candidate = text_field.clone().unwrap_or_else(|| {
        value
            .as_object()
            .and_then(|obj| obj.values().find_map(|v| v.as_str().filter(|s| !s.is_empty())))
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string())
    });

    coerce_finish(candidate, text_field)
}

fn coerce_finish(candidate: String, text_field: Option<String>) -> String {
    if candidate.contains("[object Object]") {
        tracing::warn!("stored turn content coerced to the literal \"[object Object]\"; preferring .text field");
        if let Some(text) = text_field {
            return text;
        }
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use convocore_core::types::Attachment;
    use serde_json::json;

    fn turn(content: StoredContent) -> StoredTurn {
        StoredTurn { role: StoredRole::User, content, attachments: vec![] }
    }

    #[test]
    fn plain_string_content_passes_through() {
        let normalizer = HistoryNormalizer::new(AttachmentPolicy::default());
        let turns = normalizer.normalize(&[turn(StoredContent::Text("hi".to_string()))], &[]);
        assert_eq!(turns[0].parts[0].as_text(), Some("hi"));
        assert_eq!(turns[0].role, Role::User);
    }

    #[test]
    fn object_with_text_field_is_unwrapped() {
        let normalizer = HistoryNormalizer::new(AttachmentPolicy::default());
        let content = StoredContent::Object(json!({"text": "hello", "other": 1}));
        let turns = normalizer.normalize(&[turn(content)], &[]);
        assert_eq!(turns[0].parts[0].as_text(), Some("hello"));
    }

    #[test]
    fn object_object_literal_prefers_text_field() {
        let normalizer = HistoryNormalizer::new(AttachmentPolicy::default());
        let content = StoredContent::Object(json!({"text": "[object Object]", "caption": "real content"}));
        let turns = normalizer.normalize(&[turn(content)], &[]);
        // .text is the literal itself here; since no other .text to fall
        // back to, the literal survives (documents the edge case).
        assert_eq!(turns[0].parts[0].as_text(), Some("[object Object]"));
    }

    #[test]
    fn assistant_role_maps_to_model() {
        let normalizer = HistoryNormalizer::new(AttachmentPolicy::default());
        let mut t = turn(StoredContent::Text("hi".to_string()));
        t.role = StoredRole::Assistant;
        let turns = normalizer.normalize(&[t], &[]);
        assert_eq!(turns[0].role, Role::Model);
    }

    #[test]
    fn oversized_rehydrated_image_is_dropped() {
        let mut policy = AttachmentPolicy::default();
        policy.max_image_bytes = 1;
        let normalizer = HistoryNormalizer::new(policy);
        let attachment = Attachment {
            name: "a.png".to_string(),
            kind: AttachmentKind::Image,
            declared_mime: "image/png".to_string(),
            payload: base64::engine::general_purpose::STANDARD.encode([0x89, 0x50, 0x4E, 0x47, 0, 0, 0, 0]),
        };
        let mut t = turn(StoredContent::Text("hi".to_string()));
        t.attachments = vec![attachment];
        let turns = normalizer.normalize(&[t], &[]);
        assert_eq!(turns[0].parts.len(), 1); // only the text part; image dropped
    }
}
