//! Conversation management: the data model, the bounded history
//! store, context assembly, and the orchestrator that ties them to the
//! completion service.

pub mod context;
pub mod core;
pub mod models;
pub mod store;

pub use self::core::{ChatError, ChatService, FALLBACK_REPLY, TurnReceipt};
