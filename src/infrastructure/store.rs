//! Query contract of the remote ordered message store

use std::future::Future;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::{ConversationId, Cursor, Message};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Network or backend failure
    #[error("message store unavailable: {0}")]
    Unavailable(String),

    /// The query observed its cancellation token
    #[error("query cancelled")]
    Cancelled,
}

/// An append-only, time-ordered collection of messages per conversation
///
/// Every query receives a cancellation token and should stop early once it is
/// signalled, returning [`StoreError::Cancelled`]. Implementations must be safe
/// to call concurrently for different conversations.
pub trait MessageStore: Send + Sync + 'static {
    /// The most recent `limit` messages, in any order
    fn query_initial(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<Message>, StoreError>> + Send;

    /// Up to `limit` messages with `created_at < before`, newest first
    fn query_older(
        &self,
        conversation_id: &ConversationId,
        before: Cursor,
        limit: usize,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<Message>, StoreError>> + Send;

    /// Up to `limit` messages with `created_at > after`, oldest first
    fn query_newer(
        &self,
        conversation_id: &ConversationId,
        after: Cursor,
        limit: usize,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<Message>, StoreError>> + Send;

    /// Total number of messages in the conversation
    fn count_messages(
        &self,
        conversation_id: &ConversationId,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;
}
