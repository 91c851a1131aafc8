use thiserror::Error;

/// Crate-wide result alias used by every Convocore component.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the shared core types and store traits.
///
/// Component-specific crates (`convocore-ratelimit`, `convocore-upstream`,
/// …) define their own `Error` enums and convert into this one only at the
/// pipeline boundary, where a single client-safe message has to be chosen.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid user id: {0}")]
    InvalidUserId(String),

    #[error("attachment {name} is not valid base64: {source}")]
    InvalidBase64 {
        name: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("store operation failed: {0}")]
    Store(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}
