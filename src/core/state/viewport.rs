//! Visible-window tracking and prefetch decisions

use serde::Serialize;

use super::{pagination::PaginationState, LoadingState};
use crate::domain::{Message, MessageId};

/// Index range of the window currently rendered by the UI
///
/// # Invariants
/// - `start <= end`
/// - `end` is exclusive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct VisibleRange {
    pub start: usize,
    pub end: usize,
}

impl VisibleRange {
    /// Create a range, swapping the bounds if they are reversed
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, index: usize) -> bool {
        self.start <= index && index < self.end
    }

    /// Restrict the range to a window of `len` messages
    pub fn clamp(self, len: usize) -> Self {
        let end = self.end.min(len);
        let start = self.start.min(end);
        Self { start, end }
    }

    /// A range of `span` items centered on `index` within a window of `len`
    pub fn centered_on(index: usize, span: usize, len: usize) -> Self {
        if len == 0 {
            return Self::default();
        }
        let index = index.min(len - 1);
        let span = span.clamp(1, len);
        let start = index.saturating_sub(span / 2).min(len - span);
        Self {
            start,
            end: start + span,
        }
    }
}

/// Records which slice of the window is rendered
///
/// The range is anchored to the message at `start`, so that prepends and
/// head trims keep the same messages in view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewportTracker {
    range: Option<VisibleRange>,
    anchor: Option<MessageId>,
}

impl ViewportTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last reported range, if the UI has reported one
    pub fn range(&self) -> Option<VisibleRange> {
        self.range
    }

    /// Record a viewport report from the UI
    pub fn report(&mut self, range: VisibleRange, window: &[Message]) {
        let range = range.clamp(window.len());
        self.anchor = window.get(range.start).map(|m| m.id.clone());
        self.range = Some(range);
    }

    /// Center the range on `index`, keeping the current span
    pub fn center_on(&mut self, index: usize, window: &[Message]) {
        let span = self.range.map(|r| r.len()).unwrap_or(1);
        let range = VisibleRange::centered_on(index, span, window.len());
        self.report(range, window);
    }

    /// Re-anchor the range after the window was mutated
    pub fn reanchor(&mut self, window: &[Message]) {
        let Some(range) = self.range else {
            return;
        };
        let start = match &self.anchor {
            // An anchor missing from the window was trimmed off the head
            Some(id) => window.iter().position(|m| &m.id == id).unwrap_or(0),
            None => range.start,
        };
        let moved = VisibleRange::new(start, start + range.len());
        self.report(moved, window);
    }

    pub fn clear(&mut self) {
        self.range = None;
        self.anchor = None;
    }
}

/// Which edges should be fetched ahead of the user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchPlan {
    pub older: bool,
    pub newer: bool,
}

impl PrefetchPlan {
    pub fn is_empty(&self) -> bool {
        !self.older && !self.newer
    }
}

/// Decide whether the visible range is close enough to an edge to prefetch
pub fn plan_prefetch(
    range: Option<VisibleRange>,
    window_len: usize,
    threshold: usize,
    pagination: &PaginationState,
    loading: &LoadingState,
) -> PrefetchPlan {
    let Some(range) = range else {
        return PrefetchPlan::default();
    };
    if loading.initial || loading.refreshing {
        return PrefetchPlan::default();
    }

    PrefetchPlan {
        older: range.start < threshold && pagination.has_older() && !loading.loading_older,
        newer: window_len.saturating_sub(range.end) < threshold
            && pagination.has_newer()
            && !loading.loading_newer,
    }
}
