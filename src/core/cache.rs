//! Short-horizon memoization of fetched pages
//!
//! Entries are keyed by `(conversation, direction, cursor)` and are valid for
//! one TTL after they were fetched. Expired entries are evicted lazily on
//! access; the entry count is bounded by evicting the least recently inserted
//! entries. The cache is shared across conversation sessions and survives a
//! conversation switch.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use serde::Serialize;
use tokio::time::Instant;

use super::state::Direction;
use crate::domain::{ConversationId, Cursor, Message};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub conversation_id: ConversationId,
    pub direction: Direction,
    /// `None` for the initial page
    pub cursor: Option<Cursor>,
}

impl CacheKey {
    /// Key of the initial (most recent) page of a conversation
    pub fn initial(conversation_id: &ConversationId) -> Self {
        Self {
            conversation_id: conversation_id.clone(),
            direction: Direction::Older,
            cursor: None,
        }
    }

    pub fn edge(conversation_id: &ConversationId, direction: Direction, cursor: Cursor) -> Self {
        Self {
            conversation_id: conversation_id.clone(),
            direction,
            cursor: Some(cursor),
        }
    }
}

/// A read-only snapshot of a fetched page
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub messages: Arc<[Message]>,
    pub fetched_at: Instant,
    pub next_cursor: Option<Cursor>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug)]
pub struct PageCache {
    entries: HashMap<CacheKey, CacheEntry>,
    insertion_order: VecDeque<CacheKey>,
    totals: HashMap<ConversationId, u64>,
    ttl: Duration,
    capacity: usize,
    stats: CacheStats,
}

impl PageCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            totals: HashMap::new(),
            ttl,
            capacity,
            stats: CacheStats::default(),
        }
    }

    /// Look up a page; an expired entry counts as a miss and is removed
    pub fn get(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let fresh = match self.entries.get(key) {
            Some(entry) => entry.fetched_at.elapsed() < self.ttl,
            None => {
                self.stats.misses += 1;
                tracing::trace!(?key, "page cache miss");
                return None;
            }
        };

        if fresh {
            self.stats.hits += 1;
            tracing::trace!(?key, "page cache hit");
            self.entries.get(key).cloned()
        } else {
            self.remove(key);
            self.stats.misses += 1;
            self.stats.evictions += 1;
            tracing::debug!(?key, "page cache entry expired");
            None
        }
    }

    /// Store or overwrite a page, then enforce the entry cap
    pub fn put(&mut self, key: CacheKey, messages: Vec<Message>, next_cursor: Option<Cursor>) {
        let entry = CacheEntry {
            messages: Arc::from(messages),
            fetched_at: Instant::now(),
            next_cursor,
        };
        if self.entries.insert(key.clone(), entry).is_some() {
            self.insertion_order.retain(|k| k != &key);
        }
        self.insertion_order.push_back(key);

        while self.entries.len() > self.capacity {
            let Some(oldest) = self.insertion_order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            self.stats.evictions += 1;
            tracing::debug!(key = ?oldest, "page cache entry evicted");
        }
    }

    /// Remove every entry of a conversation, including its cached total
    /// Returns the number of removed pages
    pub fn invalidate(&mut self, conversation_id: &ConversationId) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|key, _| &key.conversation_id != conversation_id);
        self.insertion_order
            .retain(|key| &key.conversation_id != conversation_id);
        self.totals.remove(conversation_id);
        before - self.entries.len()
    }

    pub fn total_count(&self, conversation_id: &ConversationId) -> Option<u64> {
        self.totals.get(conversation_id).copied()
    }

    pub fn set_total_count(&mut self, conversation_id: &ConversationId, total: u64) {
        self.totals.insert(conversation_id.clone(), total);
    }

    pub fn increment_total_count(&mut self, conversation_id: &ConversationId) {
        if let Some(total) = self.totals.get_mut(conversation_id) {
            *total += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn remove(&mut self, key: &CacheKey) {
        self.entries.remove(key);
        self.insertion_order.retain(|k| k != key);
    }
}
