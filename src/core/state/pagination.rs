//! Cursor bookkeeping for bidirectional pagination

use serde::Serialize;
use strum::{AsRefStr, Display};

use crate::domain::Cursor;

/// Direction of an edge fetch relative to the loaded window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    Older,
    Newer,
}

/// Page-fullness heuristic: a full page suggests more messages exist
///
/// A store holding exactly `limit` remaining messages also returns a full
/// page, so this can report `true` one page too many.
pub fn page_is_full(returned: usize, limit: usize) -> bool {
    limit > 0 && returned >= limit
}

/// Manages the cursor pair and has-more flags of a window
///
/// Cursors are derived from the window boundaries through [`PaginationState::sync`];
/// they are never set independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationState {
    oldest_cursor: Option<Cursor>,
    newest_cursor: Option<Cursor>,
    has_older: bool,
    has_newer: bool,
}

impl PaginationState {
    /// Create a new pagination state with unknown cursors
    pub fn new() -> Self {
        Self::default()
    }

    /// `created_at` of the earliest loaded message
    pub fn oldest_cursor(&self) -> Option<Cursor> {
        self.oldest_cursor
    }

    /// `created_at` of the latest loaded message
    pub fn newest_cursor(&self) -> Option<Cursor> {
        self.newest_cursor
    }

    /// Cursor used to fetch the next page in the given direction
    pub fn cursor(&self, direction: Direction) -> Option<Cursor> {
        match direction {
            Direction::Older => self.oldest_cursor,
            Direction::Newer => self.newest_cursor,
        }
    }

    pub fn has_older(&self) -> bool {
        self.has_older
    }

    pub fn has_newer(&self) -> bool {
        self.has_newer
    }

    pub fn has_more(&self, direction: Direction) -> bool {
        match direction {
            Direction::Older => self.has_older,
            Direction::Newer => self.has_newer,
        }
    }

    pub fn set_has_older(&mut self, has_older: bool) {
        self.has_older = has_older;
    }

    pub fn set_has_newer(&mut self, has_newer: bool) {
        self.has_newer = has_newer;
    }

    pub fn set_has_more(&mut self, direction: Direction, has_more: bool) {
        match direction {
            Direction::Older => self.has_older = has_more,
            Direction::Newer => self.has_newer = has_more,
        }
    }

    /// Resynchronize both cursors to the window boundaries
    pub fn sync(&mut self, bounds: Option<(Cursor, Cursor)>) {
        match bounds {
            Some((oldest, newest)) => {
                self.oldest_cursor = Some(oldest);
                self.newest_cursor = Some(newest);
            }
            None => {
                self.oldest_cursor = None;
                self.newest_cursor = None;
            }
        }
    }

    /// Forget cursors and has-more flags
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
