use std::{sync::Arc, time::Duration};

use chrono::{TimeDelta, Utc};
use clap::Parser;
use color_eyre::eyre::Result;
use futures::future::join_all;
use serde::Serialize;
use thousands::Separable;
use tokio::sync::watch;

use chat_pager::{
    core::cache::CacheStats,
    domain::{ConversationId, Cursor, Message},
    infrastructure::{
        cli::Cli,
        config::{Config, PagerConfig},
        memory_store::{synthetic_conversation, InMemoryStore, QueryCounts},
    },
    trace_dbg,
    utils::{initialize_logging, initialize_panic_handler},
    FetchOutcome, PaginationEngine, VisibleRange, WindowSnapshot,
};

const CONVERSATIONS: [&str; 3] = ["general", "random", "support"];

#[derive(Debug, Serialize)]
struct Summary {
    conversation_id: Option<ConversationId>,
    window_len: usize,
    total_count: u64,
    oldest_cursor: Option<Cursor>,
    newest_cursor: Option<Cursor>,
    has_older_messages: bool,
    has_newer_messages: bool,
    visible_range: Option<VisibleRange>,
    reopened_from_cache: bool,
    queries: QueryCounts,
    cache: CacheStats,
}

impl Summary {
    fn print(&self) {
        let cursor = |c: Option<Cursor>| c.map_or_else(|| "-".to_string(), |c| c.to_rfc3339());
        println!(
            "conversation:  {}",
            self.conversation_id
                .as_ref()
                .map_or("-", |id| id.as_str())
        );
        println!(
            "window:        {} of {} messages",
            self.window_len.separate_with_commas(),
            self.total_count.separate_with_commas()
        );
        println!("oldest cursor: {}", cursor(self.oldest_cursor));
        println!("newest cursor: {}", cursor(self.newest_cursor));
        println!(
            "more:          older={} newer={}",
            self.has_older_messages, self.has_newer_messages
        );
        if let Some(range) = self.visible_range {
            println!("visible:       {}..{}", range.start, range.end);
        }
        println!("reopen cached: {}", self.reopened_from_cache);
        println!(
            "store queries: initial={} older={} newer={} count={}",
            self.queries.initial.separate_with_commas(),
            self.queries.older.separate_with_commas(),
            self.queries.newer.separate_with_commas(),
            self.queries.count.separate_with_commas()
        );
        println!(
            "page cache:    hits={} misses={} evictions={}",
            self.cache.hits.separate_with_commas(),
            self.cache.misses.separate_with_commas(),
            self.cache.evictions.separate_with_commas()
        );
    }
}

fn pager_config(args: &Cli) -> Result<PagerConfig> {
    let mut pager = match Config::new() {
        Ok(config) => config.pager,
        Err(e) => {
            log::warn!("Falling back to default configuration: {e}");
            PagerConfig::default()
        }
    };
    if let Some(page_size) = args.page_size {
        pager.page_size = page_size;
    }
    if let Some(cache_size) = args.cache_size {
        pager.cache_size = cache_size;
    }
    pager.validate()?;
    Ok(pager)
}

/// Wait for a prefetch triggered by the last viewport report to land
async fn settle(rx: &mut watch::Receiver<WindowSnapshot>, patience: Duration) -> Result<()> {
    if tokio::time::timeout(patience, rx.wait_for(|s| !s.loading.is_idle()))
        .await
        .is_err()
    {
        return Ok(());
    }
    rx.wait_for(|s| s.loading.is_idle()).await?;
    Ok(())
}

async fn tokio_main() -> Result<()> {
    initialize_logging()?;

    initialize_panic_handler()?;

    let args = <Cli as Parser>::parse();
    let config = trace_dbg!(pager_config(&args)?);
    let latency = Duration::from_millis(args.latency_ms);

    let store = Arc::new(InMemoryStore::new().with_latency(latency));
    let start = Utc::now() - TimeDelta::minutes(args.messages as i64);
    for name in CONVERSATIONS {
        let conversation_id = ConversationId::from(name);
        store.extend(synthetic_conversation(
            &conversation_id,
            args.messages,
            start,
            TimeDelta::minutes(1),
        ));
    }

    // Conversations are independent, so their engines can load concurrently
    let engines: Vec<_> = CONVERSATIONS
        .iter()
        .map(|_| PaginationEngine::new(Arc::clone(&store), config.clone()))
        .collect();
    let opened = join_all(
        engines
            .iter()
            .zip(CONVERSATIONS)
            .map(|(engine, name)| engine.open_conversation(name)),
    )
    .await;
    for outcome in opened {
        log::info!("Initial load: {:?}", outcome?);
    }

    let engine = &engines[0];
    let mut rx = engine.subscribe();
    let patience = latency * 4 + Duration::from_millis(50);
    for step in 0..args.steps {
        let visible = engine.snapshot().messages.len().min(20);
        engine.report_visible_range(0, visible);
        settle(&mut rx, patience).await?;
        log::debug!("Scroll step {step}: {} messages", rx.borrow().messages.len());
    }

    let pushed = Message::new(
        format!("{}-live", CONVERSATIONS[0]),
        CONVERSATIONS[0],
        "carol",
        "just arrived",
        Utc::now(),
    );
    let pushed_id = pushed.id.clone();
    engine.add_message(pushed);
    engine.scroll_to_message(&pushed_id);

    engine.open_conversation(CONVERSATIONS[1]).await?;
    let reopened = engine.open_conversation(CONVERSATIONS[0]).await?;
    let mut snapshot = engine.snapshot();
    if let Some(last) = snapshot.messages.len().checked_sub(1) {
        engine.report_visible_range(last.saturating_sub(20), last + 1);
        settle(&mut rx, patience).await?;
        snapshot = engine.snapshot();
    }

    let summary = Summary {
        conversation_id: snapshot.conversation_id.clone(),
        window_len: snapshot.messages.len(),
        total_count: engine.get_total_message_count(),
        oldest_cursor: snapshot.oldest_cursor,
        newest_cursor: snapshot.newest_cursor,
        has_older_messages: snapshot.has_older_messages,
        has_newer_messages: snapshot.has_newer_messages,
        visible_range: snapshot.visible_range,
        reopened_from_cache: matches!(
            reopened,
            FetchOutcome::Loaded {
                from_cache: true,
                ..
            }
        ),
        queries: store.query_counts(),
        cache: engine.cache_stats(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        summary.print();
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = tokio_main().await {
        eprintln!("{} error: Something went wrong", env!("CARGO_PKG_NAME"));
        Err(e)
    } else {
        Ok(())
    }
}
