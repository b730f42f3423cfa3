// Shared fixtures for the engine integration tests

#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use chat_pager::{
    core::engine::PaginationEngine,
    domain::{ConversationId, Message},
    infrastructure::{
        config::PagerConfig,
        memory_store::{synthetic_conversation, InMemoryStore},
        reporter::ErrorReporter,
    },
    Operation, PagerError, WindowSnapshot,
};
use chrono::{TimeDelta, TimeZone, Utc};
use tokio::sync::watch;

pub type Report = (Operation, Option<ConversationId>, PagerError);

/// Collects every reported failure
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<Report>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(
        &self,
        operation: Operation,
        conversation_id: Option<&ConversationId>,
        error: &PagerError,
    ) {
        self.reports
            .lock()
            .unwrap()
            .push((operation, conversation_id.cloned(), error.clone()));
    }
}

pub fn messages(conversation: &str, count: usize) -> Vec<Message> {
    let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    synthetic_conversation(
        &ConversationId::from(conversation),
        count,
        start,
        TimeDelta::seconds(1),
    )
}

pub fn store_with(conversations: &[(&str, usize)]) -> Arc<InMemoryStore> {
    let store = InMemoryStore::new();
    for (name, count) in conversations {
        store.extend(messages(name, *count));
    }
    Arc::new(store)
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub engine: PaginationEngine<InMemoryStore>,
    pub reporter: Arc<RecordingReporter>,
}

pub fn harness(store: Arc<InMemoryStore>, config: PagerConfig) -> Harness {
    let reporter = Arc::new(RecordingReporter::default());
    let engine = PaginationEngine::with_reporter(Arc::clone(&store), config, reporter.clone());
    Harness {
        store,
        engine,
        reporter,
    }
}

/// Wait until a published snapshot satisfies `predicate`
pub async fn wait_for_snapshot(
    rx: &mut watch::Receiver<WindowSnapshot>,
    predicate: impl FnMut(&WindowSnapshot) -> bool,
) -> WindowSnapshot {
    tokio::time::timeout(Duration::from_secs(30), rx.wait_for(predicate))
        .await
        .expect("snapshot condition not reached")
        .expect("engine dropped")
        .clone()
}

/// The window is ascending, free of duplicate ids and within bounds
pub fn assert_window_invariants(snapshot: &WindowSnapshot, cache_size: usize) {
    let messages = &snapshot.messages;
    assert!(messages.len() <= cache_size, "window exceeds cache size");
    assert!(
        messages
            .windows(2)
            .all(|w| w[0].order_cmp(&w[1]).is_lt()),
        "window is not strictly ascending"
    );
}
