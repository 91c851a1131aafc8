use async_trait::async_trait;

/// Extracts text from a document attachment (PDF, DOCX, DOC). Deliberately
/// out of scope per spec.md §1 ("embedding/text-extraction libraries" are
/// an external collaborator): this trait is the seam, `convocore-server`
/// wires in a concrete implementation.
#[async_trait]
pub trait DocExtractor: Send + Sync {
    async fn extract(&self, mime: &str, data: &[u8]) -> Result<String, ExtractError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("extraction failed: {0}")]
    Failed(String),
}

/// Extractor that never succeeds, useful where no real extraction backend
/// is wired in (tests, or a deployment that declines document uploads).
pub struct NullExtractor;

#[async_trait]
impl DocExtractor for NullExtractor {
    async fn extract(&self, _mime: &str, _data: &[u8]) -> Result<String, ExtractError> {
        Err(ExtractError::Failed("document extraction is not configured".to_string()))
    }
}
