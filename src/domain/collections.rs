use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::ops::{Deref, Index};
use std::slice::Iter;

use super::message::{Cursor, Message, MessageId};

/// An ordered window of messages with automatic deduplication
///
/// Messages are kept ascending by `(created_at, id)`. Duplicate checking is
/// O(1) based on [`MessageId`]. The only operation that may break ordering is
/// [`MessageWindow::push`], which appends at the tail unconditionally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageWindow {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl MessageWindow {
    /// Creates a new empty window
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            ids: HashSet::new(),
        }
    }

    /// Creates a new window with the specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: Vec::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
        }
    }

    /// Checks if a message id is contained in the window
    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    /// Index of the message with the given id
    pub fn position(&self, id: &MessageId) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        self.messages.iter().position(|m| &m.id == id)
    }

    /// Appends a message at the tail (ignores duplicates)
    /// Returns: true if the message was actually inserted, false if it was a duplicate
    pub fn push(&mut self, message: Message) -> bool {
        if self.ids.insert(message.id.clone()) {
            self.messages.push(message);
            true
        } else {
            false
        }
    }

    /// Merges a page into the window keeping ascending order
    ///
    /// The page may arrive in any order and may overlap the window.
    /// Returns the number of messages actually inserted.
    pub fn merge(&mut self, page: impl IntoIterator<Item = Message>) -> usize {
        let mut fresh: Vec<Message> = Vec::new();
        for message in page {
            if self.ids.insert(message.id.clone()) {
                fresh.push(message);
            }
        }
        if fresh.is_empty() {
            return 0;
        }
        fresh.sort_by(Message::order_cmp);
        let inserted = fresh.len();

        let before_front = match (fresh.last(), self.messages.first()) {
            (Some(newest), Some(front)) => newest.order_cmp(front) == Ordering::Less,
            _ => true,
        };
        let after_back = match (fresh.first(), self.messages.last()) {
            (Some(oldest), Some(back)) => oldest.order_cmp(back) == Ordering::Greater,
            _ => true,
        };

        if before_front {
            self.messages.splice(0..0, fresh);
        } else if after_back {
            self.messages.extend(fresh);
        } else {
            let existing = std::mem::take(&mut self.messages);
            self.messages = merge_sorted(existing, fresh);
        }

        debug_assert_eq!(self.messages.len(), self.ids.len());
        inserted
    }

    /// Replaces the whole window with a page
    pub fn replace(&mut self, page: impl IntoIterator<Item = Message>) -> usize {
        self.clear();
        self.merge(page)
    }

    /// Keeps only the most recent `max_len` messages, dropping from the head
    /// Returns the number of dropped messages
    pub fn trim_to(&mut self, max_len: usize) -> usize {
        let excess = self.messages.len().saturating_sub(max_len);
        if excess == 0 {
            return 0;
        }
        for dropped in self.messages.drain(..excess) {
            self.ids.remove(&dropped.id);
        }
        excess
    }

    /// Earliest and latest `created_at` held in the window
    pub fn bounds(&self) -> Option<(Cursor, Cursor)> {
        let oldest = self.messages.iter().map(|m| m.created_at).min()?;
        let newest = self.messages.iter().map(|m| m.created_at).max()?;
        Some((oldest, newest))
    }

    /// Whether the window is ascending by `(created_at, id)`
    pub fn is_sorted(&self) -> bool {
        self.messages
            .windows(2)
            .all(|pair| pair[0].order_cmp(&pair[1]) == Ordering::Less)
    }

    /// Returns a reference to the internal Vec (read-only)
    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    /// Clears all messages
    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }
}

fn merge_sorted(left: Vec<Message>, right: Vec<Message>) -> Vec<Message> {
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();

    loop {
        let take_left = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => l.order_cmp(r) != Ordering::Greater,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_left { left.next() } else { right.next() };
        merged.extend(next);
    }

    merged
}

// === Standard library trait implementations ===

impl Default for MessageWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for MessageWindow {
    type Target = [Message];

    fn deref(&self) -> &Self::Target {
        &self.messages
    }
}

impl Index<usize> for MessageWindow {
    type Output = Message;

    fn index(&self, index: usize) -> &Self::Output {
        &self.messages[index]
    }
}

impl AsRef<[Message]> for MessageWindow {
    fn as_ref(&self) -> &[Message] {
        &self.messages
    }
}

impl<'a> IntoIterator for &'a MessageWindow {
    type Item = &'a Message;
    type IntoIter = Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

impl FromIterator<Message> for MessageWindow {
    fn from_iter<T: IntoIterator<Item = Message>>(iter: T) -> Self {
        let mut window = Self::new();
        window.merge(iter);
        window
    }
}

impl fmt::Display for MessageWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageWindow[{} messages]", self.len())
    }
}
