// Cancellation and prefetch behavior under simulated store latency

mod common;

use std::{sync::Arc, time::Duration};

use chat_pager::{
    domain::{ConversationId, Message},
    infrastructure::{config::PagerConfig, memory_store::InMemoryStore},
    FetchOutcome, VisibleRange,
};
use chrono::TimeDelta;
use common::*;
use pretty_assertions::assert_eq;

const LATENCY: Duration = Duration::from_millis(100);

fn slow_store(conversations: &[(&str, usize)]) -> Arc<InMemoryStore> {
    let store = InMemoryStore::new().with_latency(LATENCY);
    for (name, count) in conversations {
        store.extend(messages(name, *count));
    }
    Arc::new(store)
}

#[tokio::test(start_paused = true)]
async fn test_switching_conversation_cancels_initial_load() {
    let h = harness(slow_store(&[("a", 30), ("b", 20)]), PagerConfig::default());
    let mut rx = h.engine.subscribe();

    let engine = h.engine.clone();
    let first = tokio::spawn(async move { engine.open_conversation("a").await });
    wait_for_snapshot(&mut rx, |s| {
        s.loading.initial && s.conversation_id == Some(ConversationId::from("a"))
    })
    .await;

    assert_eq!(
        h.engine.open_conversation("b").await,
        Ok(FetchOutcome::Loaded {
            fetched: 20,
            from_cache: false
        })
    );
    assert_eq!(first.await.unwrap(), Ok(FetchOutcome::Cancelled));

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.conversation_id, Some(ConversationId::from("b")));
    assert!(snapshot
        .messages
        .iter()
        .all(|m| m.conversation_id.as_str() == "b"));
    assert!(h.reporter.reports().is_empty());

    // The cancelled page was never cached
    assert_eq!(
        h.engine.open_conversation("a").await,
        Ok(FetchOutcome::Loaded {
            fetched: 30,
            from_cache: false
        })
    );
    assert_eq!(h.store.query_counts().initial, 3);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_supersedes_older_load() {
    let h = harness(slow_store(&[("conv", 300)]), PagerConfig::default());
    let mut rx = h.engine.subscribe();
    h.engine.open_conversation("conv").await.unwrap();

    let engine = h.engine.clone();
    let older = tokio::spawn(async move { engine.load_older_messages().await });
    wait_for_snapshot(&mut rx, |s| s.loading.loading_older).await;

    let refreshed = h.engine.refresh_messages().await;
    assert_eq!(
        refreshed,
        Ok(FetchOutcome::Loaded {
            fetched: 100,
            from_cache: false
        })
    );
    assert_eq!(older.await.unwrap(), Ok(FetchOutcome::Cancelled));

    let snapshot = h.engine.snapshot();
    assert!(snapshot.loading.is_idle());
    assert_eq!(snapshot.messages.len(), 100);
    assert_window_invariants(&snapshot, 1000);

    // The superseded older page left no cache entry behind
    assert_eq!(
        h.engine.load_older_messages().await,
        Ok(FetchOutcome::Loaded {
            fetched: 50,
            from_cache: false
        })
    );
    assert_eq!(h.store.query_counts().older, 2);
}

#[tokio::test(start_paused = true)]
async fn test_edge_loads_are_exclusive() {
    let h = harness(slow_store(&[("conv", 300)]), PagerConfig::default());
    let mut rx = h.engine.subscribe();
    h.engine.open_conversation("conv").await.unwrap();

    let engine = h.engine.clone();
    let older = tokio::spawn(async move { engine.load_older_messages().await });
    wait_for_snapshot(&mut rx, |s| s.loading.loading_older).await;

    assert_eq!(
        h.engine.load_older_messages().await,
        Ok(FetchOutcome::Skipped(chat_pager::SkipReason::Busy))
    );
    assert_eq!(
        h.engine.load_newer_messages().await,
        Ok(FetchOutcome::Skipped(chat_pager::SkipReason::Busy))
    );
    assert!(older.await.unwrap().is_ok());
    assert_eq!(h.store.query_counts().older, 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_in_flight_load() {
    let h = harness(slow_store(&[("conv", 30)]), PagerConfig::default());
    let mut rx = h.engine.subscribe();

    let engine = h.engine.clone();
    let initial = tokio::spawn(async move { engine.open_conversation("conv").await });
    wait_for_snapshot(&mut rx, |s| s.loading.initial).await;

    h.engine.close();
    assert_eq!(initial.await.unwrap(), Ok(FetchOutcome::Cancelled));
    assert_eq!(h.engine.snapshot().conversation_id, None);
}

#[tokio::test(start_paused = true)]
async fn test_visible_range_near_top_prefetches_older() {
    let h = harness(slow_store(&[("conv", 500)]), PagerConfig::default());
    let mut rx = h.engine.subscribe();
    h.engine.open_conversation("conv").await.unwrap();

    h.engine.report_visible_range(0, 20);
    let snapshot = wait_for_snapshot(&mut rx, |s| s.messages.len() == 150).await;

    // The same messages stay in view after the prepend
    assert_eq!(snapshot.visible_range, Some(VisibleRange::new(50, 70)));
    assert_eq!(
        snapshot.messages[50].id,
        chat_pager::MessageId::from("conv-000400")
    );

    tokio::time::sleep(LATENCY * 5).await;
    assert_eq!(h.store.query_counts().older, 1);
    assert_eq!(h.engine.snapshot().messages.len(), 150);
}

#[tokio::test(start_paused = true)]
async fn test_visible_range_near_bottom_prefetches_newer_after_cache_hit() {
    let h = harness(slow_store(&[("a", 100), ("b", 10)]), PagerConfig::default());
    let mut rx = h.engine.subscribe();
    h.engine.open_conversation("a").await.unwrap();
    let newest = h.engine.snapshot().newest_cursor.unwrap();

    // Arrives while the cached initial page is still fresh
    h.store.extend((1..=5).map(|i| {
        Message::new(
            format!("a-late-{i}"),
            "a",
            "bob",
            "missed",
            newest + TimeDelta::seconds(i),
        )
    }));
    h.engine.open_conversation("b").await.unwrap();
    h.engine.open_conversation("a").await.unwrap();
    assert!(h.engine.snapshot().has_newer_messages);

    h.engine.report_visible_range(90, 100);
    let snapshot = wait_for_snapshot(&mut rx, |s| {
        s.messages.len() == 105 && s.loading.is_idle()
    })
    .await;

    assert!(!snapshot.has_newer_messages);
    assert_eq!(
        snapshot.newest_cursor,
        Some(newest + TimeDelta::seconds(5))
    );
    assert_window_invariants(&snapshot, 1000);
    assert_eq!(h.store.query_counts().newer, 1);
}

#[tokio::test(start_paused = true)]
async fn test_switching_conversation_discards_prefetch() {
    let h = harness(slow_store(&[("a", 500), ("b", 20)]), PagerConfig::default());
    let mut rx = h.engine.subscribe();
    h.engine.open_conversation("a").await.unwrap();

    h.engine.report_visible_range(0, 20);
    wait_for_snapshot(&mut rx, |s| s.loading.loading_older).await;
    h.engine.open_conversation("b").await.unwrap();

    tokio::time::sleep(LATENCY * 5).await;
    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.conversation_id, Some(ConversationId::from("b")));
    assert_eq!(snapshot.messages.len(), 20);
    assert!(snapshot.loading.is_idle());
    assert!(h.reporter.reports().is_empty());
}

fn live_message(conversation: &str, after: &Message) -> Message {
    Message::new(
        format!("{conversation}-live"),
        conversation,
        "carol",
        "pushed mid-load",
        after.created_at + TimeDelta::seconds(60),
    )
}

#[tokio::test(start_paused = true)]
async fn test_live_push_during_initial_load_is_kept() {
    let h = harness(slow_store(&[("conv", 30)]), PagerConfig::default());
    let mut rx = h.engine.subscribe();
    let live = live_message("conv", &messages("conv", 30)[29]);

    let engine = h.engine.clone();
    let task = tokio::spawn(async move { engine.open_conversation("conv").await });
    wait_for_snapshot(&mut rx, |s| s.loading.initial).await;

    assert!(h.engine.add_message(live.clone()));
    assert_eq!(
        task.await.unwrap(),
        Ok(FetchOutcome::Loaded {
            fetched: 30,
            from_cache: false
        })
    );

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.messages.len(), 31);
    assert_eq!(snapshot.messages.last(), Some(&live));
    assert_eq!(snapshot.newest_cursor, Some(live.created_at));
    assert_eq!(snapshot.total_count, Some(31));
    assert_window_invariants(&snapshot, 1000);
}

#[tokio::test(start_paused = true)]
async fn test_live_push_during_refresh_is_kept() {
    let h = harness(slow_store(&[("conv", 30)]), PagerConfig::default());
    let mut rx = h.engine.subscribe();
    h.engine.open_conversation("conv").await.unwrap();
    let live = live_message("conv", &messages("conv", 30)[29]);

    let engine = h.engine.clone();
    let task = tokio::spawn(async move { engine.refresh_messages().await });
    wait_for_snapshot(&mut rx, |s| s.loading.refreshing).await;

    assert!(h.engine.add_message(live.clone()));
    assert_eq!(
        task.await.unwrap(),
        Ok(FetchOutcome::Loaded {
            fetched: 30,
            from_cache: false
        })
    );

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.messages.len(), 31);
    assert_eq!(snapshot.messages.last(), Some(&live));
    assert_eq!(snapshot.newest_cursor, Some(live.created_at));
    assert_window_invariants(&snapshot, 1000);

    // A pushed message already persisted by the store is not doubled
    h.store.insert(live.clone());
    h.engine.refresh_messages().await.unwrap();
    assert_eq!(h.engine.snapshot().messages.len(), 31);
}
