use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use convocore_core::types::{Attachment, AttachmentKind, MessagePart};

use crate::dimensions::{jpeg_dimensions, png_dimensions};
use crate::extractor::DocExtractor;
use crate::magic;
use crate::policy::AttachmentPolicy;

const TRUNCATION_MARKER: &str = "\n…[truncated]";

/// Result of [`AttachmentProcessor::process`] (spec.md §4.2 contract).
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub parts: Vec<MessagePart>,
    pub enhanced_text: String,
}

/// Validates and normalizes inbound binary attachments (spec.md §4.2).
pub struct AttachmentProcessor {
    policy: AttachmentPolicy,
    extractor: Arc<dyn DocExtractor>,
}

impl AttachmentProcessor {
    pub fn new(policy: AttachmentPolicy, extractor: Arc<dyn DocExtractor>) -> Self {
        Self { policy, extractor }
    }

    pub async fn process(&self, attachments: &[Attachment], message_text: &str) -> ProcessOutcome {
        let mut enhanced = message_text.to_string();
        let mut parts = Vec::new();

        let (in_scope, dropped) = if attachments.len() > self.policy.max_attachments_per_message {
            (&attachments[..self.policy.max_attachments_per_message], attachments.len() - self.policy.max_attachments_per_message)
        } else {
            (attachments, 0)
        };
        if dropped > 0 {
            enhanced.push_str(&format!(
                "\n\n[Note: only the first {} attachments were processed; {} were dropped]",
                self.policy.max_attachments_per_message, dropped
            ));
        }

        for attachment in in_scope {
            match self.process_one(attachment).await {
                Outcome::Image(part) => parts.push(part),
                Outcome::Note(note) => enhanced.push_str(&note),
            }
        }

        parts.push(MessagePart::text(enhanced.clone()));
        ProcessOutcome { parts, enhanced_text: enhanced }
    }

    async fn process_one(&self, attachment: &Attachment) -> Outcome {
        if attachment.kind == AttachmentKind::Unknown {
            return Outcome::Note(format!(
                "\n\n**Attachment: {}**\n[Unsupported attachment type]",
                attachment.name
            ));
        }

        let decoded = match base64::engine::general_purpose::STANDARD.decode(attachment.payload.trim()) {
            Ok(bytes) => bytes,
            Err(_) => {
                return Outcome::Note(format!(
                    "\n\n**{}: {}**\n[Invalid attachment data]",
                    label(attachment.kind, &attachment.declared_mime),
                    attachment.name
                ));
            }
        };

        let (max_bytes, label_str) = match attachment.kind {
            AttachmentKind::Image => (self.policy.max_image_bytes, label(attachment.kind, &attachment.declared_mime)),
            AttachmentKind::Document => (self.policy.max_doc_bytes, label(attachment.kind, &attachment.declared_mime)),
            AttachmentKind::Text => (self.policy.max_text_bytes, label(attachment.kind, &attachment.declared_mime)),
            AttachmentKind::Unknown => unreachable!("handled above"),
        };
        if decoded.len() > max_bytes {
            return Outcome::Note(format!(
                "\n\n**{}: {}**\n[File too large: {} bytes (max: {} bytes)]",
                label_str,
                attachment.name,
                decoded.len(),
                max_bytes
            ));
        }

        match attachment.kind {
            AttachmentKind::Image => self.process_image(attachment, &decoded),
            AttachmentKind::Document => self.process_document(attachment, &decoded).await,
            AttachmentKind::Text => self.process_text(attachment, &decoded),
            AttachmentKind::Unknown => unreachable!("handled above"),
        }
    }

    fn process_image(&self, attachment: &Attachment, decoded: &[u8]) -> Outcome {
        if let Some(false) = magic::check(&attachment.declared_mime, decoded) {
            return Outcome::Note(format!(
                "\n\n**Image: {}**\n[Invalid file format - file signature does not match declared type]",
                attachment.name
            ));
        }

        let dims = match attachment.declared_mime.as_str() {
            "image/png" => Some(png_dimensions(decoded)),
            "image/jpeg" => Some(jpeg_dimensions(decoded)),
            _ => None,
        };

        if let Some(dims) = dims {
            let (width, height) = dims.map(|d| (d.width, d.height)).unwrap_or((0, 0));
            let oversized = width == 0 || height == 0 || width > self.policy.max_image_dim || height > self.policy.max_image_dim;
            if oversized {
                return Outcome::Note(format!(
                    "\n\n**Image: {}**\n[Image dimensions too large: {}x{} (max: {}x{})]",
                    attachment.name, width, height, self.policy.max_image_dim, self.policy.max_image_dim
                ));
            }
        }

        Outcome::Image(MessagePart::inline_data(attachment.declared_mime.clone(), attachment.payload.clone()))
    }

    async fn process_document(&self, attachment: &Attachment, decoded: &[u8]) -> Outcome {
        if let Some(false) = magic::check(&attachment.declared_mime, decoded) {
            let (section, reason) = match attachment.declared_mime.as_str() {
                "application/pdf" => ("PDF Document", "does not match PDF format"),
                _ => ("Document", "does not match declared type"),
            };
            return Outcome::Note(format!(
                "\n\n**{}: {}**\n[Invalid file format - file signature {}]",
                section, attachment.name, reason
            ));
        }

        let section = doc_section(&attachment.declared_mime);
        let extraction = tokio::time::timeout(
            self.policy.doc_extraction_deadline,
            self.extractor.extract(&attachment.declared_mime, decoded),
        )
        .await;

        match extraction {
            Ok(Ok(text)) => {
                let truncated = truncate_with_marker(&text, self.policy.max_text_chars);
                Outcome::Note(format!("\n\n**{}: {}**\n{}", section, attachment.name, truncated))
            }
            Ok(Err(err)) => Outcome::Note(format!(
                "\n\n**{}: {}**\n[Document extraction failed: {}]",
                section, attachment.name, err
            )),
            Err(_) => Outcome::Note(format!(
                "\n\n**{}: {}**\n[Document extraction timed out after {:?}]",
                section, attachment.name, self.policy.doc_extraction_deadline
            )),
        }
    }

    fn process_text(&self, attachment: &Attachment, decoded: &[u8]) -> Outcome {
        let text = match std::str::from_utf8(decoded) {
            Ok(text) => text,
            Err(_) => {
                return Outcome::Note(format!(
                    "\n\n**File: {}**\n[Invalid file format - not valid UTF-8 text]",
                    attachment.name
                ));
            }
        };
        let truncated = truncate_with_marker(text, self.policy.max_text_file_chars);
        Outcome::Note(format!("\n\n**File: {}**\n{}", attachment.name, truncated))
    }
}

enum Outcome {
    Image(MessagePart),
    Note(String),
}

fn doc_section(mime: &str) -> &'static str {
    match mime {
        "application/pdf" => "PDF Document",
        _ => "Document",
    }
}

fn label(kind: AttachmentKind, mime: &str) -> &'static str {
    match kind {
        AttachmentKind::Image => "Image",
        AttachmentKind::Document => doc_section(mime),
        AttachmentKind::Text => "File",
        AttachmentKind::Unknown => "Attachment",
    }
}

fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

// Kept for callers that need the extraction deadline without constructing
// a full processor (e.g. the pipeline, when composing timeouts).
pub fn default_extraction_deadline() -> Duration {
    AttachmentPolicy::default().doc_extraction_deadline
}
