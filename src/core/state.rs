use std::sync::Arc;

use serde::Serialize;

use crate::domain::{ConversationId, Cursor, Message, MessageId, MessageWindow};

mod pagination;
mod viewport;

pub use pagination::{page_is_full, Direction, PaginationState};
pub use viewport::{plan_prefetch, PrefetchPlan, ViewportTracker, VisibleRange};

/// Loading flags of a conversation session
///
/// # Invariants
/// - at most one of `loading_older` / `loading_newer` is set
/// - `initial` and `refreshing` are mutually exclusive and clear the edge flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadingState {
    pub initial: bool,
    pub loading_older: bool,
    pub loading_newer: bool,
    pub refreshing: bool,
}

impl LoadingState {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }

    pub fn is_loading(&self, direction: Direction) -> bool {
        match direction {
            Direction::Older => self.loading_older,
            Direction::Newer => self.loading_newer,
        }
    }

    fn begin_initial(&mut self, refreshing: bool) {
        *self = Self {
            initial: !refreshing,
            refreshing,
            ..Self::default()
        };
    }

    fn finish_initial(&mut self) {
        self.initial = false;
        self.refreshing = false;
    }

    /// Returns false when another operation already owns the window edges
    fn begin_edge(&mut self, direction: Direction) -> bool {
        if self.initial || self.refreshing || self.loading_older || self.loading_newer {
            return false;
        }
        match direction {
            Direction::Older => self.loading_older = true,
            Direction::Newer => self.loading_newer = true,
        }
        true
    }

    fn finish_edge(&mut self, direction: Direction) {
        match direction {
            Direction::Older => self.loading_older = false,
            Direction::Newer => self.loading_newer = false,
        }
    }
}

/// Observable state of the window, published after every change
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSnapshot {
    pub conversation_id: Option<ConversationId>,
    pub messages: Arc<[Message]>,
    pub loading: LoadingState,
    pub error: Option<String>,
    pub has_older_messages: bool,
    pub has_newer_messages: bool,
    pub oldest_cursor: Option<Cursor>,
    pub newest_cursor: Option<Cursor>,
    pub total_count: Option<u64>,
    pub visible_range: Option<VisibleRange>,
}

impl Default for WindowSnapshot {
    fn default() -> Self {
        Self {
            conversation_id: None,
            messages: Arc::from(Vec::new()),
            loading: LoadingState::default(),
            error: None,
            has_older_messages: false,
            has_newer_messages: false,
            oldest_cursor: None,
            newest_cursor: None,
            total_count: None,
            visible_range: None,
        }
    }
}

/// Transient state of one open conversation
///
/// All mutations are synchronous; the engine serializes them per session.
#[derive(Debug, Clone)]
pub struct SessionState {
    conversation_id: ConversationId,
    window: MessageWindow,
    pagination: PaginationState,
    loading: LoadingState,
    viewport: ViewportTracker,
    error: Option<String>,
    total_count: Option<u64>,
    cache_size: usize,
    /// Pushes accepted while an initial page is in flight
    pending_live: Vec<Message>,
    /// Published copy of the window, rebuilt whenever the window changes
    messages: Arc<[Message]>,
}

type Fingerprint = (usize, Option<MessageId>, Option<MessageId>);

impl SessionState {
    pub fn new(conversation_id: ConversationId, cache_size: usize) -> Self {
        Self {
            conversation_id,
            window: MessageWindow::with_capacity(cache_size.min(1024)),
            pagination: PaginationState::new(),
            loading: LoadingState::default(),
            viewport: ViewportTracker::new(),
            error: None,
            total_count: None,
            cache_size,
            pending_live: Vec::new(),
            messages: Arc::from(Vec::new()),
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn window(&self) -> &MessageWindow {
        &self.window
    }

    pub fn pagination(&self) -> &PaginationState {
        &self.pagination
    }

    pub fn loading(&self) -> LoadingState {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    pub fn visible_range(&self) -> Option<VisibleRange> {
        self.viewport.range()
    }

    pub fn set_total_count(&mut self, total_count: Option<u64>) {
        self.total_count = total_count;
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Enter the initial (or refreshing) state, clearing both edge flags
    ///
    /// A refresh also forgets both cursors until the replacement page lands.
    pub fn begin_initial(&mut self, refreshing: bool) {
        self.loading.begin_initial(refreshing);
        if refreshing {
            self.pagination.reset();
        }
    }

    /// Replace the window with the most recent page
    ///
    /// `from_cache` marks a page that may be up to one TTL stale, in which case
    /// newer messages may exist. Pushes accepted while the page was in flight
    /// are appended again after the replacement.
    pub fn apply_initial_page(&mut self, page: Vec<Message>, limit: usize, from_cache: bool) {
        self.pagination.set_has_older(page_is_full(page.len(), limit));
        self.pagination.set_has_newer(from_cache);
        self.window.replace(page);
        self.viewport.clear();
        let mut replayed = 0;
        for message in std::mem::take(&mut self.pending_live) {
            if self.window.push(message) {
                replayed += 1;
            }
        }
        if replayed > 0 {
            log::debug!("Replayed {replayed} live messages into {}", self.conversation_id);
            self.total_count = self.total_count.map(|count| count + replayed);
        }
        self.settle();
        self.error = None;
        self.loading.finish_initial();
    }

    /// Initial or refresh failure: the window is cleared
    pub fn fail_initial(&mut self, error: String) {
        self.pending_live.clear();
        self.window.clear();
        self.messages = Arc::from(Vec::new());
        self.pagination.reset();
        self.viewport.clear();
        self.error = Some(error);
        self.loading.finish_initial();
    }

    /// Leave the initial state without touching the window
    pub fn abort_initial(&mut self) {
        self.pending_live.clear();
        self.loading.finish_initial();
    }

    pub fn begin_edge(&mut self, direction: Direction) -> bool {
        self.loading.begin_edge(direction)
    }

    /// Merge an older or newer page into the window
    /// Returns whether the window actually changed
    pub fn apply_edge_page(&mut self, direction: Direction, page: Vec<Message>, limit: usize) -> bool {
        let before = self.fingerprint();
        self.pagination
            .set_has_more(direction, page_is_full(page.len(), limit));
        self.window.merge(page);
        self.settle();
        self.error = None;
        self.loading.finish_edge(direction);
        self.fingerprint() != before
    }

    /// Edge failure: previously loaded messages are preserved
    pub fn fail_edge(&mut self, direction: Direction, error: String) {
        self.error = Some(error);
        self.loading.finish_edge(direction);
    }

    pub fn abort_edge(&mut self, direction: Direction) {
        self.loading.finish_edge(direction);
    }

    /// Append a pushed message at the tail
    ///
    /// Out-of-order pushes are not re-sorted, and the newest cursor never
    /// regresses. Returns false for a duplicate id. While an initial page is
    /// in flight the message is also held back for replay on top of it.
    pub fn merge_live(&mut self, message: Message) -> bool {
        let replay = (self.loading.initial || self.loading.refreshing).then(|| message.clone());
        if !self.window.push(message) {
            return false;
        }
        self.pending_live.extend(replay);
        self.total_count = self.total_count.map(|count| count + 1);
        self.settle();
        true
    }

    pub fn report_visible_range(&mut self, range: VisibleRange) {
        self.viewport.report(range, self.window.as_slice());
    }

    /// Center the visible range on a message in the window
    pub fn scroll_to(&mut self, id: &MessageId) -> bool {
        match self.window.position(id) {
            Some(index) => {
                self.viewport.center_on(index, self.window.as_slice());
                true
            }
            None => false,
        }
    }

    pub fn prefetch_plan(&self, threshold: usize) -> PrefetchPlan {
        plan_prefetch(
            self.viewport.range(),
            self.window.len(),
            threshold,
            &self.pagination,
            &self.loading,
        )
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            conversation_id: Some(self.conversation_id.clone()),
            messages: Arc::clone(&self.messages),
            loading: self.loading,
            error: self.error.clone(),
            has_older_messages: self.pagination.has_older(),
            has_newer_messages: self.pagination.has_newer(),
            oldest_cursor: self.pagination.oldest_cursor(),
            newest_cursor: self.pagination.newest_cursor(),
            total_count: self.total_count,
            visible_range: self.viewport.range(),
        }
    }

    /// Enforce the memory bound and resynchronize derived state
    fn settle(&mut self) {
        let dropped = self.window.trim_to(self.cache_size);
        if dropped > 0 {
            log::debug!(
                "Trimmed {dropped} messages from {} (window {})",
                self.conversation_id,
                self.window.len()
            );
        }
        self.pagination.sync(self.window.bounds());
        self.viewport.reanchor(self.window.as_slice());
        self.messages = Arc::from(self.window.as_slice());
    }

    fn fingerprint(&self) -> Fingerprint {
        (
            self.window.len(),
            self.window.first().map(|m| m.id.clone()),
            self.window.last().map(|m| m.id.clone()),
        )
    }
}
