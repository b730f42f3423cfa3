//! Pagination engine for a single conversation window
//!
//! The engine serves three fetch intents (initial, older, newer) against a
//! [`MessageStore`], memoizes pages in a [`PageCache`] and merges pushed
//! messages into the same window.
//!
//! # Concurrency
//!
//! All window mutations happen synchronously under one lock, so operations
//! never interleave destructively. Store queries are the only suspension
//! points and run without the lock held. Every fetch carries a child token of
//! its session; a result whose token was cancelled, or whose session was
//! replaced, is discarded before it can touch shared state.
//!
//! Prefetches are executed by a background task fed through a channel, so
//! viewport reports never block on the store.

use std::future::Future;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError, Weak,
};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::{
    cache::{CacheKey, CacheStats, PageCache},
    error::{Operation, PagerError},
    state::{Direction, SessionState, VisibleRange, WindowSnapshot},
};
use crate::{
    domain::{ConversationId, Message, MessageId},
    infrastructure::{
        config::PagerConfig,
        reporter::{ErrorReporter, TracingReporter},
        store::{MessageStore, StoreError},
    },
};

/// Why a fetch request did not reach the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No conversation is open
    NoConversation,
    /// Another operation owns the window edges
    Busy,
    /// The last page in this direction was short
    NoMoreMessages,
    /// The window is empty, so there is no cursor to page from
    CursorUnknown,
    /// A queued prefetch is no longer wanted by the viewport
    NotNeeded,
}

/// Result of a fetch intent
///
/// Cancellation is an outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Loaded { fetched: usize, from_cache: bool },
    Skipped(SkipReason),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    User,
    Prefetch { session_id: u64 },
}

#[derive(Debug, Clone, Copy)]
struct PrefetchRequest {
    session_id: u64,
    direction: Direction,
}

struct Session {
    id: u64,
    state: SessionState,
    cancel: CancellationToken,
    initial_fetch: Option<CancellationToken>,
    older_fetch: Option<CancellationToken>,
    newer_fetch: Option<CancellationToken>,
}

impl Session {
    fn new(id: u64, state: SessionState) -> Self {
        Self {
            id,
            state,
            cancel: CancellationToken::new(),
            initial_fetch: None,
            older_fetch: None,
            newer_fetch: None,
        }
    }

    fn fetch_slot(&mut self, direction: Direction) -> &mut Option<CancellationToken> {
        match direction {
            Direction::Older => &mut self.older_fetch,
            Direction::Newer => &mut self.newer_fetch,
        }
    }

    /// Cancel every in-flight fetch while keeping the session open
    fn supersede_fetches(&mut self) {
        for token in [
            self.initial_fetch.take(),
            self.older_fetch.take(),
            self.newer_fetch.take(),
        ]
        .into_iter()
        .flatten()
        {
            token.cancel();
        }
    }
}

struct EngineState {
    cache: PageCache,
    session: Option<Session>,
}

struct Inner<S> {
    store: Arc<S>,
    config: PagerConfig,
    reporter: Arc<dyn ErrorReporter>,
    state: Mutex<EngineState>,
    snapshot_tx: watch::Sender<WindowSnapshot>,
    prefetch_tx: mpsc::UnboundedSender<PrefetchRequest>,
    shutdown: CancellationToken,
    next_session_id: AtomicU64,
}

impl<S> Drop for Inner<S> {
    fn drop(&mut self) {
        self.shutdown.cancel();
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = state.session.take() {
            session.cancel.cancel();
        }
    }
}

/// Handle to a pagination engine
///
/// Cloning is cheap; all clones drive the same window.
pub struct PaginationEngine<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for PaginationEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: MessageStore> PaginationEngine<S> {
    /// Create an engine reporting failures through `tracing`
    ///
    /// # Panics
    /// Panics if called outside of a Tokio runtime.
    pub fn new(store: Arc<S>, config: PagerConfig) -> Self {
        Self::with_reporter(store, config, Arc::new(TracingReporter))
    }

    /// Create an engine with a custom observability collaborator
    ///
    /// # Panics
    /// Panics if called outside of a Tokio runtime.
    pub fn with_reporter(
        store: Arc<S>,
        config: PagerConfig,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(WindowSnapshot::default());
        let (prefetch_tx, prefetch_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let cache = PageCache::new(config.cache_ttl(), config.cache_capacity);

        let inner = Arc::new(Inner {
            store,
            config,
            reporter,
            state: Mutex::new(EngineState {
                cache,
                session: None,
            }),
            snapshot_tx,
            prefetch_tx,
            shutdown: shutdown.clone(),
            next_session_id: AtomicU64::new(1),
        });
        tokio::spawn(run_prefetcher(Arc::downgrade(&inner), prefetch_rx, shutdown));

        Self { inner }
    }

    pub fn config(&self) -> &PagerConfig {
        &self.inner.config
    }

    /// Observe window changes
    pub fn subscribe(&self) -> watch::Receiver<WindowSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// The current observable state
    pub fn snapshot(&self) -> WindowSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock().cache.stats()
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.lock()
            .session
            .as_ref()
            .map(|s| s.state.conversation_id().clone())
    }

    /// Select a conversation and run its initial load
    ///
    /// Any in-flight work for the previously open conversation is cancelled.
    /// The page cache is kept, so returning to a recent conversation is served
    /// without a store query.
    pub async fn open_conversation(
        &self,
        conversation_id: impl Into<ConversationId>,
    ) -> Result<FetchOutcome, PagerError> {
        let conversation_id = conversation_id.into();
        {
            let mut state = self.lock();
            if let Some(previous) = state.session.take() {
                log::debug!(
                    "Closing conversation {}",
                    previous.state.conversation_id()
                );
                previous.cancel.cancel();
            }
            if conversation_id.is_valid() {
                let id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
                let session_state =
                    SessionState::new(conversation_id.clone(), self.inner.config.cache_size);
                state.session = Some(Session::new(id, session_state));
            }
            self.publish(&state);
        }

        if !conversation_id.is_valid() {
            let error = PagerError::InvalidConversation;
            self.inner
                .reporter
                .report(Operation::OpenConversation, None, &error);
            return Err(error);
        }

        log::info!("Opened conversation {conversation_id}");
        self.run_initial(Operation::InitialLoad).await
    }

    /// Tear down the open conversation, cancelling its in-flight fetches
    pub fn close(&self) {
        let mut state = self.lock();
        if let Some(session) = state.session.take() {
            log::debug!("Closing conversation {}", session.state.conversation_id());
            session.cancel.cancel();
        }
        self.publish(&state);
    }

    /// Drop cached pages of the open conversation and reload it from scratch
    pub async fn refresh_messages(&self) -> Result<FetchOutcome, PagerError> {
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(session) = state.session.as_ref() else {
                return Ok(FetchOutcome::Skipped(SkipReason::NoConversation));
            };
            let conversation_id = session.state.conversation_id();
            let removed = state.cache.invalidate(conversation_id);
            log::debug!("Refreshing {conversation_id}, invalidated {removed} cached pages");
        }
        self.run_initial(Operation::Refresh).await
    }

    pub async fn load_older_messages(&self) -> Result<FetchOutcome, PagerError> {
        self.load_edge(Direction::Older, Trigger::User).await
    }

    pub async fn load_newer_messages(&self) -> Result<FetchOutcome, PagerError> {
        self.load_edge(Direction::Newer, Trigger::User).await
    }

    /// Merge a message delivered in real time
    ///
    /// Returns false if no session is open for its conversation or the id is
    /// already in the window.
    pub fn add_message(&self, message: Message) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(session) = state.session.as_mut() else {
            return false;
        };
        if &message.conversation_id != session.state.conversation_id() {
            log::debug!(
                "Ignoring pushed message {} for inactive conversation {}",
                message.id,
                message.conversation_id
            );
            return false;
        }
        if let Some(newest) = session.state.pagination().newest_cursor() {
            if message.created_at < newest {
                log::warn!(
                    "Out-of-order push {} appended after newer messages",
                    message.id
                );
            }
        }

        let conversation_id = message.conversation_id.clone();
        if !session.state.merge_live(message) {
            return false;
        }
        state.cache.increment_total_count(&conversation_id);
        self.request_prefetch(session);
        self.publish(state);
        true
    }

    /// Record the index range rendered by the UI and prefetch if near an edge
    pub fn report_visible_range(&self, start: usize, end: usize) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(session) = state.session.as_mut() else {
            return;
        };
        session
            .state
            .report_visible_range(VisibleRange::new(start, end));
        self.request_prefetch(session);
        self.publish(state);
    }

    /// Center the visible range on a message
    ///
    /// Returns whether the message is in the current window. A message that
    /// was trimmed out is not fetched.
    pub fn scroll_to_message(&self, id: &MessageId) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(session) = state.session.as_mut() else {
            return false;
        };
        if !session.state.scroll_to(id) {
            return false;
        }
        self.request_prefetch(session);
        self.publish(state);
        true
    }

    pub fn get_visible_range(&self) -> Option<VisibleRange> {
        self.lock()
            .session
            .as_ref()
            .and_then(|s| s.state.visible_range())
    }

    /// Total messages in the conversation, falling back to the window length
    /// while the store count is unknown
    pub fn get_total_message_count(&self) -> u64 {
        self.lock().session.as_ref().map_or(0, |s| {
            s.state
                .total_count()
                .unwrap_or(s.state.window().len() as u64)
        })
    }

    pub fn clear_error(&self) {
        let mut state = self.lock();
        if let Some(session) = state.session.as_mut() {
            session.state.clear_error();
        }
        self.publish(&state);
    }

    async fn run_initial(&self, operation: Operation) -> Result<FetchOutcome, PagerError> {
        let limit = self.inner.config.initial_load_count;
        let (conversation_id, session_id, token) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(session) = state.session.as_mut() else {
                return Ok(FetchOutcome::Skipped(SkipReason::NoConversation));
            };
            session.supersede_fetches();
            session.state.begin_initial(operation == Operation::Refresh);
            let conversation_id = session.state.conversation_id().clone();

            if let Some(entry) = state.cache.get(&CacheKey::initial(&conversation_id)) {
                let fetched = entry.messages.len();
                session
                    .state
                    .set_total_count(state.cache.total_count(&conversation_id));
                session
                    .state
                    .apply_initial_page(entry.messages.to_vec(), limit, true);
                log::debug!("Initial page of {conversation_id} served from cache ({fetched})");
                self.request_prefetch(session);
                self.publish(state);
                return Ok(FetchOutcome::Loaded {
                    fetched,
                    from_cache: true,
                });
            }

            let token = session.cancel.child_token();
            session.initial_fetch = Some(token.clone());
            let session_id = session.id;
            self.publish(state);
            (conversation_id, session_id, token)
        };

        log::debug!("Fetching initial page of {conversation_id} (limit {limit})");
        let store = &self.inner.store;
        let (page, count) = tokio::join!(
            cancellable(&token, store.query_initial(&conversation_id, limit, &token)),
            cancellable(&token, store.count_messages(&conversation_id, &token)),
        );

        let mut failure = None;
        let outcome = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(session) = state.session.as_mut().filter(|s| s.id == session_id) else {
                return Ok(FetchOutcome::Cancelled);
            };
            if token.is_cancelled() {
                return Ok(FetchOutcome::Cancelled);
            }
            session.initial_fetch = None;

            let outcome = match page {
                Ok(page) => {
                    let fetched = page.len();
                    log::debug!("Fetched initial page of {conversation_id}: {fetched} messages");
                    let next_cursor = page.iter().map(|m| m.created_at).min();
                    state.cache.put(
                        CacheKey::initial(&conversation_id),
                        page.clone(),
                        next_cursor,
                    );
                    match count {
                        Ok(total) => {
                            state.cache.set_total_count(&conversation_id, total);
                            session.state.set_total_count(Some(total));
                        }
                        Err(e) => {
                            log::warn!("Counting messages of {conversation_id} failed: {e}");
                            session.state.set_total_count(None);
                        }
                    }
                    session.state.apply_initial_page(page, limit, false);
                    self.request_prefetch(session);
                    Ok(FetchOutcome::Loaded {
                        fetched,
                        from_cache: false,
                    })
                }
                Err(error) => match PagerError::from_store(operation, error) {
                    Some(error) => {
                        session.state.fail_initial(error.to_string());
                        failure = Some(error.clone());
                        Err(error)
                    }
                    None => {
                        session.state.abort_initial();
                        Ok(FetchOutcome::Cancelled)
                    }
                },
            };
            self.publish(state);
            outcome
        };

        if let Some(error) = failure {
            self.inner
                .reporter
                .report(operation, Some(&conversation_id), &error);
        }
        outcome
    }

    async fn load_edge(
        &self,
        direction: Direction,
        trigger: Trigger,
    ) -> Result<FetchOutcome, PagerError> {
        let operation = match direction {
            Direction::Older => Operation::LoadOlder,
            Direction::Newer => Operation::LoadNewer,
        };
        let page_size = self.inner.config.page_size;

        let (conversation_id, cursor, session_id, token) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(session) = state.session.as_mut() else {
                return Ok(FetchOutcome::Skipped(SkipReason::NoConversation));
            };
            if let Trigger::Prefetch { session_id } = trigger {
                let plan = session
                    .state
                    .prefetch_plan(self.inner.config.prefetch_threshold);
                let wanted = match direction {
                    Direction::Older => plan.older,
                    Direction::Newer => plan.newer,
                };
                if session.id != session_id || !wanted {
                    return Ok(FetchOutcome::Skipped(SkipReason::NotNeeded));
                }
            }
            if !session.state.loading().is_idle() {
                return Ok(FetchOutcome::Skipped(SkipReason::Busy));
            }
            if !session.state.pagination().has_more(direction) {
                return Ok(FetchOutcome::Skipped(SkipReason::NoMoreMessages));
            }
            let Some(cursor) = session.state.pagination().cursor(direction) else {
                return Ok(FetchOutcome::Skipped(SkipReason::CursorUnknown));
            };
            let conversation_id = session.state.conversation_id().clone();

            let key = CacheKey::edge(&conversation_id, direction, cursor);
            if let Some(entry) = state.cache.get(&key) {
                let fetched = entry.messages.len();
                let changed =
                    session
                        .state
                        .apply_edge_page(direction, entry.messages.to_vec(), page_size);
                log::debug!("{direction} page of {conversation_id} served from cache ({fetched})");
                if changed {
                    self.request_prefetch(session);
                }
                self.publish(state);
                return Ok(FetchOutcome::Loaded {
                    fetched,
                    from_cache: true,
                });
            }

            if !session.state.begin_edge(direction) {
                return Ok(FetchOutcome::Skipped(SkipReason::Busy));
            }
            let token = session.cancel.child_token();
            *session.fetch_slot(direction) = Some(token.clone());
            let session_id = session.id;
            self.publish(state);
            (conversation_id, cursor, session_id, token)
        };

        log::debug!("Fetching {direction} page of {conversation_id} from {cursor}");
        let store = &self.inner.store;
        let result = match direction {
            Direction::Older => {
                cancellable(
                    &token,
                    store.query_older(&conversation_id, cursor, page_size, &token),
                )
                .await
            }
            Direction::Newer => {
                cancellable(
                    &token,
                    store.query_newer(&conversation_id, cursor, page_size, &token),
                )
                .await
            }
        };

        let mut failure = None;
        let outcome = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(session) = state.session.as_mut().filter(|s| s.id == session_id) else {
                return Ok(FetchOutcome::Cancelled);
            };
            if token.is_cancelled() {
                return Ok(FetchOutcome::Cancelled);
            }
            *session.fetch_slot(direction) = None;

            let outcome = match result {
                Ok(page) => {
                    let fetched = page.len();
                    log::debug!("Fetched {direction} page of {conversation_id} from {cursor}: {fetched} messages");
                    let times = page.iter().map(|m| m.created_at);
                    let next_cursor = match direction {
                        Direction::Older => times.min(),
                        Direction::Newer => times.max(),
                    };
                    state.cache.put(
                        CacheKey::edge(&conversation_id, direction, cursor),
                        page.clone(),
                        next_cursor,
                    );
                    if session.state.apply_edge_page(direction, page, page_size) {
                        self.request_prefetch(session);
                    }
                    Ok(FetchOutcome::Loaded {
                        fetched,
                        from_cache: false,
                    })
                }
                Err(error) => match PagerError::from_store(operation, error) {
                    Some(error) => {
                        session.state.fail_edge(direction, error.to_string());
                        failure = Some(error.clone());
                        Err(error)
                    }
                    None => {
                        session.state.abort_edge(direction);
                        Ok(FetchOutcome::Cancelled)
                    }
                },
            };
            self.publish(state);
            outcome
        };

        if let Some(error) = failure {
            self.inner
                .reporter
                .report(operation, Some(&conversation_id), &error);
        }
        outcome
    }

    fn request_prefetch(&self, session: &Session) {
        let plan = session
            .state
            .prefetch_plan(self.inner.config.prefetch_threshold);
        let wanted = [
            (plan.older, Direction::Older),
            (plan.newer, Direction::Newer),
        ];
        for direction in wanted.into_iter().filter_map(|(want, d)| want.then_some(d)) {
            let request = PrefetchRequest {
                session_id: session.id,
                direction,
            };
            if self.inner.prefetch_tx.send(request).is_err() {
                log::debug!("Prefetcher stopped, dropping {direction} prefetch");
            }
        }
    }

    fn publish(&self, state: &EngineState) {
        let snapshot = state
            .session
            .as_ref()
            .map(|s| s.state.snapshot())
            .unwrap_or_default();
        self.inner.snapshot_tx.send_replace(snapshot);
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn cancellable<T>(
    token: &CancellationToken,
    query: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(StoreError::Cancelled),
        result = query => result,
    }
}

/// Executes queued prefetch requests until the engine is dropped
async fn run_prefetcher<S: MessageStore>(
    inner: Weak<Inner<S>>,
    mut requests: mpsc::UnboundedReceiver<PrefetchRequest>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            request = requests.recv() => {
                let Some(request) = request else {
                    break;
                };
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let engine = PaginationEngine { inner };
                let trigger = Trigger::Prefetch { session_id: request.session_id };
                match engine.load_edge(request.direction, trigger).await {
                    Ok(outcome) => log::trace!("Prefetch {} finished: {outcome:?}", request.direction),
                    Err(e) => log::debug!("Prefetch {} failed: {e}", request.direction),
                }
            }
        }
    }
    log::debug!("Prefetcher stopped");
}
