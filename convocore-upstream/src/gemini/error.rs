use eventsource_stream::EventStreamError;
use reqwest::header::InvalidHeaderValue;
use snafu::Snafu;
use url::Url;

pub type Result<T> = std::result::Result<T, Error>;

/// Wire-level errors talking to the upstream Gemini-compatible API.
///
/// Mirrors `adk-gemini::client::Error` variant-for-variant (minus the
/// batch/cache/file/vertex-only variants this crate has no use for, per
/// the scope this wire client covers).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("failed to parse API key"))]
    InvalidApiKey { source: InvalidHeaderValue },

    #[snafu(display("failed to construct URL (probably incorrect model name): {suffix}"))]
    ConstructUrl { source: url::ParseError, suffix: String },

    PerformRequestNew { source: reqwest::Error },

    #[snafu(display("failed to perform request to '{url}'"))]
    PerformRequest { source: reqwest::Error, url: Url },

    #[snafu(display(
        "bad response from server; code {code}; description: {}",
        description.as_deref().unwrap_or("none")
    ))]
    BadResponse { code: u16, description: Option<String> },

    #[snafu(display("failed to obtain stream SSE part"))]
    BadPart { source: EventStreamError<reqwest::Error> },

    #[snafu(display("failed to deserialize JSON response"))]
    Deserialize { source: serde_json::Error },

    #[snafu(display("failed to decode response body"))]
    DecodeResponse { source: reqwest::Error },
}

impl Error {
    /// True for the subset of errors the credential cache treats as an
    /// auth failure (spec.md §4.4: HTTP 401/403 or `API_KEY_INVALID`).
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Error::BadResponse { code, description } => {
                *code == 401
                    || *code == 403
                    || description.as_deref().is_some_and(|d| d.contains("API_KEY_INVALID"))
            }
            _ => false,
        }
    }
}
