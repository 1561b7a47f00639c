//! Conversation history
//!
//! This module provides:
//! - `Session`: one conversation with its persona/voice binding
//! - `SessionRegistry`: recency-ordered sessions plus the active one
//! - `ConversationStore`: persistence, as JSON files or in memory

mod registry;
mod session;
mod store;

pub use registry::{AppendOutcome, SessionRegistry};
pub use session::{
    derive_title, Message, Sender, Session, SessionSummary, DEFAULT_TITLE, TITLE_MAX_CHARS,
};
pub use store::{ConversationStore, JsonFileStore, MemoryStore};
