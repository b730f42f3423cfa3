//! In-process [`MessageStore`] used by the demo binary and tests
//!
//! Supports simulated latency, simulated outages and per-query counters.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        PoisonError, RwLock, RwLockReadGuard,
    },
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::store::{MessageStore, StoreError};
use crate::domain::{ConversationId, Cursor, Message};

/// Number of queries served, per query kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueryCounts {
    pub initial: usize,
    pub older: usize,
    pub newer: usize,
    pub count: usize,
}

impl QueryCounts {
    /// Page queries, excluding count queries
    pub fn pages(&self) -> usize {
        self.initial + self.older + self.newer
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    conversations: RwLock<HashMap<ConversationId, Vec<Message>>>,
    latency: Duration,
    failing: AtomicBool,
    initial_queries: AtomicUsize,
    older_queries: AtomicUsize,
    newer_queries: AtomicUsize,
    count_queries: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every query by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Insert a message at its ordered position
    pub fn insert(&self, message: Message) {
        let mut conversations = self
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let messages = conversations
            .entry(message.conversation_id.clone())
            .or_default();
        if messages.iter().any(|m| m.id == message.id) {
            return;
        }
        let at = messages.partition_point(|m| m.order_cmp(&message).is_lt());
        messages.insert(at, message);
    }

    pub fn extend(&self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.insert(message);
        }
    }

    /// Make every subsequent query fail with [`StoreError::Unavailable`]
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn query_counts(&self) -> QueryCounts {
        QueryCounts {
            initial: self.initial_queries.load(Ordering::SeqCst),
            older: self.older_queries.load(Ordering::SeqCst),
            newer: self.newer_queries.load(Ordering::SeqCst),
            count: self.count_queries.load(Ordering::SeqCst),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConversationId, Vec<Message>>> {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn round_trip(&self, cancel: &CancellationToken) -> Result<(), StoreError> {
        if !self.latency.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StoreError::Cancelled),
                _ = tokio::time::sleep(self.latency) => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }
}

impl MessageStore for InMemoryStore {
    async fn query_initial(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>, StoreError> {
        self.initial_queries.fetch_add(1, Ordering::SeqCst);
        self.round_trip(cancel).await?;

        let conversations = self.read();
        let page = conversations
            .get(conversation_id)
            .map(|messages| messages.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default();
        Ok(page)
    }

    async fn query_older(
        &self,
        conversation_id: &ConversationId,
        before: Cursor,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>, StoreError> {
        self.older_queries.fetch_add(1, Ordering::SeqCst);
        self.round_trip(cancel).await?;

        let conversations = self.read();
        let page = conversations
            .get(conversation_id)
            .map(|messages| {
                messages
                    .iter()
                    .rev()
                    .filter(|m| m.created_at < before)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(page)
    }

    async fn query_newer(
        &self,
        conversation_id: &ConversationId,
        after: Cursor,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>, StoreError> {
        self.newer_queries.fetch_add(1, Ordering::SeqCst);
        self.round_trip(cancel).await?;

        let conversations = self.read();
        let page = conversations
            .get(conversation_id)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| m.created_at > after)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(page)
    }

    async fn count_messages(
        &self,
        conversation_id: &ConversationId,
        cancel: &CancellationToken,
    ) -> Result<u64, StoreError> {
        self.count_queries.fetch_add(1, Ordering::SeqCst);
        self.round_trip(cancel).await?;

        let count = self.read().get(conversation_id).map_or(0, Vec::len);
        Ok(count as u64)
    }
}

/// Generate `count` messages one `spacing` apart, starting at `start`
pub fn synthetic_conversation(
    conversation_id: &ConversationId,
    count: usize,
    start: DateTime<Utc>,
    spacing: TimeDelta,
) -> Vec<Message> {
    let senders = ["alice", "bob"];
    let mut created_at = start;
    (0..count)
        .map(|i| {
            let message = Message::new(
                format!("{conversation_id}-{i:06}"),
                conversation_id.clone(),
                senders[i % senders.len()],
                format!("message #{i}"),
                created_at,
            );
            created_at += spacing;
            message
        })
        .collect()
}
