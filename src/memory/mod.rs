//! Chat memory
//!
//! Bounded per-session conversation history, keyed by session id. Sessions
//! are independent; nothing is shared between them.

pub mod sessions;
pub mod store;

pub use sessions::{session_uuid, ChatSession, SessionStore};
pub use store::{ChatHistory, ChatMessage};
