// Integration tests for the pagination engine
// Drives the engine against the in-memory store and checks the published window

mod common;

use chat_pager::{
    domain::{ConversationId, Message, MessageId},
    infrastructure::config::PagerConfig,
    FetchOutcome, Operation, PagerError, SkipReason, VisibleRange,
};
use chrono::TimeDelta;
use common::*;
use pretty_assertions::assert_eq;

fn loaded(fetched: usize, from_cache: bool) -> Result<FetchOutcome, PagerError> {
    Ok(FetchOutcome::Loaded {
        fetched,
        from_cache,
    })
}

#[tokio::test]
async fn test_empty_conversation() {
    let h = harness(store_with(&[]), PagerConfig::default());

    assert_eq!(h.engine.open_conversation("empty").await, loaded(0, false));

    let snapshot = h.engine.snapshot();
    assert!(snapshot.messages.is_empty());
    assert!(!snapshot.has_older_messages);
    assert_eq!(snapshot.error, None);
    assert_eq!(snapshot.oldest_cursor, None);
    assert_eq!(h.engine.get_total_message_count(), 0);
    assert_eq!(
        h.engine.load_older_messages().await,
        Ok(FetchOutcome::Skipped(SkipReason::NoMoreMessages))
    );
}

#[tokio::test]
async fn test_initial_then_short_older_page() {
    let all = messages("conv", 120);
    let h = harness(store_with(&[("conv", 120)]), PagerConfig::default());

    assert_eq!(h.engine.open_conversation("conv").await, loaded(100, false));
    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.messages.to_vec(), all[20..].to_vec());
    assert!(snapshot.has_older_messages);
    assert!(!snapshot.has_newer_messages);
    assert_eq!(snapshot.total_count, Some(120));

    assert_eq!(h.engine.load_older_messages().await, loaded(20, false));
    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.messages.to_vec(), all);
    assert!(!snapshot.has_older_messages);
    assert_eq!(snapshot.oldest_cursor, Some(all[0].created_at));
    assert_window_invariants(&snapshot, 1000);

    assert_eq!(
        h.engine.load_older_messages().await,
        Ok(FetchOutcome::Skipped(SkipReason::NoMoreMessages))
    );
    assert_eq!(h.store.query_counts().older, 1);
}

#[tokio::test]
async fn test_window_is_trimmed_to_cache_size() {
    let config = PagerConfig {
        cache_size: 50,
        initial_load_count: 50,
        ..PagerConfig::default()
    };
    let all = messages("conv", 60);
    let h = harness(store_with(&[("conv", 60)]), config);

    h.engine.open_conversation("conv").await.unwrap();
    assert_eq!(h.engine.snapshot().messages.to_vec(), all[10..].to_vec());

    // The prepended page overflows the bound and is trimmed away again
    assert_eq!(h.engine.load_older_messages().await, loaded(10, false));
    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.messages.to_vec(), all[10..].to_vec());
    assert_eq!(snapshot.oldest_cursor, Some(all[10].created_at));
    assert_eq!(snapshot.newest_cursor, Some(all[59].created_at));
    assert!(!snapshot.has_older_messages);
    assert_window_invariants(&snapshot, 50);
}

#[tokio::test]
async fn test_newer_page_overflow_drops_head() {
    let config = PagerConfig {
        cache_size: 50,
        initial_load_count: 50,
        ..PagerConfig::default()
    };
    let all = messages("conv", 60);
    let h = harness(store_with(&[("conv", 50)]), config);

    h.engine.open_conversation("conv").await.unwrap();
    h.store.extend(all[50..].to_vec());

    // Reopening from cache leaves room for newer messages
    h.engine.open_conversation("other").await.unwrap();
    assert_eq!(h.engine.open_conversation("conv").await, loaded(50, true));
    assert!(h.engine.snapshot().has_newer_messages);

    assert_eq!(h.engine.load_newer_messages().await, loaded(10, false));
    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.messages.to_vec(), all[10..].to_vec());
    assert_eq!(snapshot.oldest_cursor, Some(all[10].created_at));
    assert_eq!(snapshot.newest_cursor, Some(all[59].created_at));
    assert!(!snapshot.has_newer_messages);
    assert_window_invariants(&snapshot, 50);
}

#[tokio::test]
async fn test_out_of_order_push_keeps_newest_cursor() {
    let h = harness(store_with(&[("conv", 10)]), PagerConfig::default());
    h.engine.open_conversation("conv").await.unwrap();
    let newest = h.engine.snapshot().newest_cursor.unwrap();

    let late = Message::new(
        "late",
        "conv",
        "carol",
        "sent while offline",
        newest - TimeDelta::seconds(30),
    );
    assert!(h.engine.add_message(late));

    let snapshot = h.engine.snapshot();
    assert_eq!(
        snapshot.messages.last().map(|m| m.id.clone()),
        Some(MessageId::from("late"))
    );
    assert_eq!(snapshot.newest_cursor, Some(newest));
    assert_eq!(snapshot.messages.len(), 11);
}

#[tokio::test]
async fn test_live_push_is_idempotent_and_counted() {
    let h = harness(store_with(&[("conv", 120)]), PagerConfig::default());
    h.engine.open_conversation("conv").await.unwrap();
    let newest = h.engine.snapshot().newest_cursor.unwrap();

    let live = Message::new("live", "conv", "alice", "hello", newest + TimeDelta::seconds(1));
    assert!(h.engine.add_message(live.clone()));
    assert!(!h.engine.add_message(live.clone()));

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.messages.len(), 101);
    assert_eq!(snapshot.newest_cursor, Some(live.created_at));
    assert_eq!(h.engine.get_total_message_count(), 121);
}

#[tokio::test]
async fn test_push_for_other_conversation_is_ignored() {
    let h = harness(store_with(&[("conv", 5)]), PagerConfig::default());
    h.engine.open_conversation("conv").await.unwrap();

    let stray = Message::new("stray", "other", "bob", "hi", chrono::Utc::now());
    assert!(!h.engine.add_message(stray));
    assert_eq!(h.engine.snapshot().messages.len(), 5);
}

#[tokio::test]
async fn test_reopening_conversation_is_served_from_cache() {
    let h = harness(
        store_with(&[("a", 300), ("b", 10)]),
        PagerConfig::default(),
    );

    h.engine.open_conversation("a").await.unwrap();
    assert_eq!(h.engine.load_older_messages().await, loaded(50, false));
    h.engine.open_conversation("b").await.unwrap();

    assert_eq!(h.engine.open_conversation("a").await, loaded(100, true));
    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.messages.len(), 100);
    assert!(snapshot.has_newer_messages);
    assert_eq!(snapshot.total_count, Some(300));

    assert_eq!(h.engine.load_older_messages().await, loaded(50, true));
    assert_eq!(h.store.query_counts().initial, 2);
    assert_eq!(h.store.query_counts().older, 1);
    assert_eq!(h.engine.cache_stats().hits, 2);
}

#[tokio::test]
async fn test_refresh_bypasses_cache() {
    let h = harness(store_with(&[("conv", 30)]), PagerConfig::default());
    h.engine.open_conversation("conv").await.unwrap();

    h.store.extend(vec![Message::new(
        "fresh",
        "conv",
        "bob",
        "new",
        h.engine.snapshot().newest_cursor.unwrap() + TimeDelta::seconds(1),
    )]);

    assert_eq!(h.engine.refresh_messages().await, loaded(31, false));
    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.messages.len(), 31);
    assert!(!snapshot.loading.refreshing);
    assert!(!snapshot.has_newer_messages);
    assert_eq!(h.store.query_counts().initial, 2);
}

#[tokio::test]
async fn test_initial_failure_clears_window_and_reports() {
    let h = harness(store_with(&[("conv", 30)]), PagerConfig::default());
    h.store.set_failing(true);

    let result = h.engine.open_conversation("conv").await;
    assert!(matches!(
        result,
        Err(PagerError::StoreUnavailable {
            operation: Operation::InitialLoad,
            ..
        })
    ));

    let snapshot = h.engine.snapshot();
    assert!(snapshot.messages.is_empty());
    assert!(snapshot.error.is_some());
    assert!(snapshot.loading.is_idle());

    let reports = h.reporter.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, Operation::InitialLoad);
    assert_eq!(reports[0].1, Some(ConversationId::from("conv")));

    // Retry re-invokes the same operation
    h.store.set_failing(false);
    assert_eq!(h.engine.refresh_messages().await, loaded(30, false));
    assert_eq!(h.engine.snapshot().error, None);
}

#[tokio::test]
async fn test_older_failure_preserves_window() {
    let h = harness(store_with(&[("conv", 300)]), PagerConfig::default());
    h.engine.open_conversation("conv").await.unwrap();
    let before = h.engine.snapshot();

    h.store.set_failing(true);
    let result = h.engine.load_older_messages().await;
    assert!(matches!(
        result,
        Err(PagerError::StoreUnavailable {
            operation: Operation::LoadOlder,
            ..
        })
    ));

    let after = h.engine.snapshot();
    assert_eq!(after.messages, before.messages);
    assert_eq!(after.oldest_cursor, before.oldest_cursor);
    assert!(after.has_older_messages);
    assert!(after.error.is_some());
    assert_eq!(h.reporter.reports().len(), 1);

    h.engine.clear_error();
    assert_eq!(h.engine.snapshot().error, None);

    h.store.set_failing(false);
    assert_eq!(h.engine.load_older_messages().await, loaded(50, false));
}

#[tokio::test]
async fn test_invalid_conversation_is_reported() {
    let h = harness(store_with(&[("conv", 5)]), PagerConfig::default());
    h.engine.open_conversation("conv").await.unwrap();

    assert_eq!(
        h.engine.open_conversation("").await,
        Err(PagerError::InvalidConversation)
    );
    assert!(h.engine.snapshot().messages.is_empty());
    assert_eq!(
        h.reporter.reports(),
        vec![(
            Operation::OpenConversation,
            None,
            PagerError::InvalidConversation
        )]
    );
}

#[tokio::test]
async fn test_scroll_to_message() {
    let h = harness(store_with(&[("conv", 100)]), PagerConfig::default());
    h.engine.open_conversation("conv").await.unwrap();
    h.engine.report_visible_range(80, 100);

    assert!(h.engine.scroll_to_message(&MessageId::from("conv-000050")));
    assert_eq!(h.engine.get_visible_range(), Some(VisibleRange::new(40, 60)));
    assert!(!h.engine.scroll_to_message(&MessageId::from("missing")));
}
