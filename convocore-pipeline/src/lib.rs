//! Per-message orchestration (C7) and ordered graceful shutdown (C8)
//! (spec.md §4.7, §4.8).

pub mod pipeline;
pub mod shutdown;

pub use pipeline::{Pipeline, PipelineRequest};
pub use shutdown::{Quiesce, ShutdownController};
