//! Error taxonomy of the pagination engine
//!
//! A cancelled fetch is not an error: it resolves to
//! [`FetchOutcome::Cancelled`](crate::core::engine::FetchOutcome::Cancelled)
//! and is never surfaced to the user.

use strum::{AsRefStr, Display};
use thiserror::Error;

use crate::infrastructure::store::StoreError;

/// Engine operation names used to tag reported failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    OpenConversation,
    InitialLoad,
    LoadOlder,
    LoadNewer,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PagerError {
    /// The message store failed; the operation can be retried
    #[error("{operation} failed: {message}")]
    StoreUnavailable {
        operation: Operation,
        message: String,
    },

    /// No usable conversation id was given
    #[error("no conversation selected")]
    InvalidConversation,
}

impl PagerError {
    /// Convert a store failure, or `None` if the store reported cancellation
    pub fn from_store(operation: Operation, error: StoreError) -> Option<Self> {
        match error {
            StoreError::Cancelled => None,
            StoreError::Unavailable(message) => Some(Self::StoreUnavailable { operation, message }),
        }
    }

    /// Whether re-invoking the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}
