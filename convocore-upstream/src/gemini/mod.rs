//! Minimal Gemini Studio wire client: exactly the surface spec.md §6
//! names for the injected upstream provider (streamed generation with
//! `text()`/`promptFeedback`/`finishReason`/`functionCalls`, plus a
//! single-shot call used for credential validation). Batch, cache, file
//! and embedding APIs exist in the teacher's full `adk-gemini` but are
//! out of this spec's scope and are not carried over.

pub mod client;
pub mod error;
pub mod model;

pub use client::GeminiClient;
pub use error::Error;
pub use model::{GenerateContentChunk, GenerateContentRequest, WireContent, WireFunctionCall, WirePart};
