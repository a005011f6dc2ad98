//! Embedded relational + full-text Store: sessions, messages, memories,
//! profiles, app-state, and session summaries.

mod error;
mod models;
mod store;

pub use error::{Result, StoreError};
pub use models::{
    AgentProfile, MemoryEntry, MemoryKind, MemorySearchHit, Message, MessageRole, NewMemoryEntry,
    NewMessage, Session, SessionSummary, UserProfile,
};
pub use store::Store;
