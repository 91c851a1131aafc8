//! Credential-cached upstream connector: C4 `CredentialCache` + C5
//! `UpstreamConnector` (spec.md §4.4, §4.5), plus the one concrete wire
//! client ([`gemini`]) this core ships with.

pub mod connector;
pub mod credential;
pub mod error;
pub mod gemini;

pub use connector::{Outcome, SendContext, UpstreamConnector, API_TIMEOUT, MAX_RESPONSE_CHARS, MAX_TOOL_CALLS_PER_MESSAGE, MAX_TOOL_RESULT_CHARS};
pub use credential::{fingerprint, is_syntactically_valid, sanitize, ClientHandle, CredentialCache, CRED_CACHE_MAX};
pub use error::{Error, Result};
