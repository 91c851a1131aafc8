use std::time::Duration;

/// Thresholds consulted by both the attachment processor (C2) and the
/// history normalizer (C3) when it re-validates rehydrated images, so the
/// two never drift apart (spec.md §9 Design Notes).
#[derive(Debug, Clone, Copy)]
pub struct AttachmentPolicy {
    pub max_attachments_per_message: usize,
    pub max_image_bytes: usize,
    pub max_doc_bytes: usize,
    pub max_text_bytes: usize,
    pub max_text_chars: usize,
    pub max_text_file_chars: usize,
    pub max_image_dim: u32,
    pub doc_extraction_deadline: Duration,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_attachments_per_message: 10,
            max_image_bytes: 10 * 1024 * 1024,
            max_doc_bytes: 10 * 1024 * 1024,
            max_text_bytes: 5 * 1024 * 1024,
            max_text_chars: 8_000,
            max_text_file_chars: 16_000,
            max_image_dim: 4096,
            doc_extraction_deadline: Duration::from_secs(30),
        }
    }
}
