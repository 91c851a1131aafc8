use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the credential cache and upstream connector.
///
/// Wraps the low-level `snafu`-based wire client error; this is the
/// boundary where a single, generic, client-safe message gets chosen
/// (spec.md §7: "no internal error text... is ever emitted in a
/// client-visible event").
#[derive(Debug, Error)]
pub enum Error {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] crate::gemini::error::Error),
}
