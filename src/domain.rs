//! Domain types
//!
//! This module contains the conversation data model:
//! - Messages and their ordering key
//! - The ordered, de-duplicated message window

pub mod collections;
pub mod message;

pub use collections::MessageWindow;
pub use message::{ConversationId, Cursor, MediaType, Message, MessageId};
