//! Shared types, error type, and cross-cutting traits for the Convocore
//! chat core (`UserId`, message parts, store traits, clock).

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod stores;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use events::{DebugInfoKind, OutboundEvent};
pub use stores::{ChatStore, NullChatStore, ToolHandler, VectorRecord, VectorStore};
pub use types::{
    Attachment, AttachmentKind, FunctionResponsePart, InlineData, MessagePart, NormalizedTurn,
    Role, StoredContent, StoredRole, StoredTurn, UserId,
};
