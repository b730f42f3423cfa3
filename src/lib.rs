//! # chat-pager - bidirectional paginated message window
//!
//! Keeps a sliding, memory-bounded window of chat messages for one
//! conversation, fetched on demand from an ordered message store.
//!
//! ## Architecture Overview
//!
//! - **Domain** (`domain`): messages and the ordered, de-duplicated window
//! - **Core** (`core`): pagination state, the page cache and the engine
//!   orchestrating fetches, cancellation and prefetching
//! - **Infrastructure** (`infrastructure`): the store contract, an in-memory
//!   store, failure reporting, configuration and CLI
//! - **Utils** (`utils`): logging, panic handling and paths
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chat_pager::{
//!     infrastructure::{config::PagerConfig, memory_store::InMemoryStore},
//!     PaginationEngine,
//! };
//!
//! # async fn demo() -> chat_pager::Result<()> {
//! let store = Arc::new(InMemoryStore::new());
//! let engine = PaginationEngine::new(store, PagerConfig::default());
//!
//! engine.open_conversation("general").await?;
//! engine.report_visible_range(0, 20);
//!
//! let snapshot = engine.snapshot();
//! println!("{} messages loaded", snapshot.messages.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`domain`] - Message types and the message window
//! - [`core`] - Window state, cache and engine
//! - [`infrastructure`] - Store, reporter, config and CLI
//! - [`utils`] - Logging, panic handling and paths

pub mod core;
pub mod domain;
pub mod infrastructure;
pub mod utils;

// Re-exports for convenience
pub use crate::core::{
    engine::{FetchOutcome, PaginationEngine, SkipReason},
    error::{Operation, PagerError},
    state::{Direction, LoadingState, VisibleRange, WindowSnapshot},
};
pub use domain::{ConversationId, Message, MessageId};
pub use infrastructure::store::{MessageStore, StoreError};

/// Result type used throughout the library
pub type Result<T> = color_eyre::eyre::Result<T>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
