//! End-to-end stale-while-revalidate behavior against real media.

use futures::future::BoxFuture;
use futures::FutureExt;
use silent_cache::{
    FetchError, MemoryMedium, QueryOptions, QueryStatus, SilentCache, SilentQuery, SqliteMedium,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn topics(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Fetcher that resolves to `value` after `delay`.
fn delayed_ok(
    value: Vec<String>,
    delay: Duration,
) -> impl Fn() -> BoxFuture<'static, Result<Vec<String>, FetchError>>
       + Send
       + Sync
       + 'static {
    move || {
        let value = value.clone();
        async move {
            tokio::time::sleep(delay).await;
            Ok::<_, FetchError>(value)
        }
        .boxed()
    }
}

/// Fetcher that fails with `message` after `delay`.
fn delayed_err(
    message: &'static str,
    delay: Duration,
) -> impl Fn() -> BoxFuture<'static, Result<Vec<String>, FetchError>>
       + Send
       + Sync
       + 'static {
    move || {
        async move {
            tokio::time::sleep(delay).await;
            Err::<Vec<String>, _>(FetchError::network(message))
        }
        .boxed()
    }
}

#[tokio::test(start_paused = true)]
async fn empty_cache_loads_then_stores() {
    let cache = SilentCache::new(MemoryMedium::new());

    let mut query = cache.query(
        "topics",
        delayed_ok(topics(&["a", "b"]), Duration::from_millis(100)),
    );

    let initial = query.snapshot();
    assert!(initial.loading);
    assert_eq!(initial.data, None);

    let settled = query.settled().await;
    assert!(!settled.loading);
    assert_eq!(settled.data, Some(topics(&["a", "b"])));
    assert_eq!(settled.status, QueryStatus::Refreshed);
    assert_eq!(
        cache.get::<Vec<String>>("topics"),
        Some(topics(&["a", "b"]))
    );
}

#[tokio::test(start_paused = true)]
async fn cached_value_served_then_replaced() {
    let cache = SilentCache::new(MemoryMedium::new());
    cache.set("topics", &topics(&["a", "b"]));

    let mut query = cache.query(
        "topics",
        delayed_ok(topics(&["a", "b", "c"]), Duration::from_millis(100)),
    );

    let initial = query.snapshot();
    assert!(!initial.loading);
    assert_eq!(initial.data, Some(topics(&["a", "b"])));
    assert_eq!(initial.status, QueryStatus::Refreshing);

    let settled = query.settled().await;
    assert_eq!(settled.data, Some(topics(&["a", "b", "c"])));
    assert_eq!(settled.error, None);
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_keeps_stale_value() {
    let cache = SilentCache::new(MemoryMedium::new());
    cache.set("topics", &topics(&["a", "b"]));

    let mut query = cache.query(
        "topics",
        delayed_err("network error", Duration::from_millis(100)),
    );

    let initial = query.snapshot();
    assert_eq!(initial.data, Some(topics(&["a", "b"])));
    assert!(!initial.loading);

    let settled = query.settled().await;
    assert_eq!(settled.data, Some(topics(&["a", "b"])));
    assert!(!settled.loading);
    assert_eq!(settled.status, QueryStatus::ErroredWithStale);
    assert_eq!(
        settled.error.map(|e| e.to_string()).as_deref(),
        Some("network error")
    );
    assert_eq!(
        cache.get::<Vec<String>>("topics"),
        Some(topics(&["a", "b"]))
    );
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_without_cache_is_empty_error() {
    let cache = SilentCache::new(MemoryMedium::new());

    let mut query = cache.query(
        "topics",
        delayed_err("network error", Duration::from_millis(100)),
    );

    let settled = query.settled().await;
    assert_eq!(settled.data, None);
    assert!(!settled.loading);
    assert_eq!(settled.status, QueryStatus::ErroredEmpty);
    assert_eq!(
        settled.error.map(|e| e.to_string()).as_deref(),
        Some("network error")
    );
    assert_eq!(cache.get::<Vec<String>>("topics"), None);
}

#[tokio::test(start_paused = true)]
async fn last_resolved_write_wins() {
    let cache = SilentCache::new(MemoryMedium::new());

    // Started first, resolves last
    let mut slow = cache.query("x", delayed_ok(topics(&["slow"]), Duration::from_millis(200)));
    let mut fast = cache.query("x", delayed_ok(topics(&["fast"]), Duration::from_millis(50)));

    assert_eq!(fast.settled().await.data, Some(topics(&["fast"])));
    assert_eq!(cache.get::<Vec<String>>("x"), Some(topics(&["fast"])));

    assert_eq!(slow.settled().await.data, Some(topics(&["slow"])));
    assert_eq!(cache.get::<Vec<String>>("x"), Some(topics(&["slow"])));
}

#[tokio::test(start_paused = true)]
async fn last_resolved_write_wins_in_reverse() {
    let cache = SilentCache::new(MemoryMedium::new());

    let mut fast = cache.query("x", delayed_ok(topics(&["fast"]), Duration::from_millis(50)));
    let mut slow = cache.query("x", delayed_ok(topics(&["slow"]), Duration::from_millis(200)));

    fast.settled().await;
    slow.settled().await;

    assert_eq!(cache.get::<Vec<String>>("x"), Some(topics(&["slow"])));
    // Each instance keeps the value its own fetch produced
    assert_eq!(fast.snapshot().data, Some(topics(&["fast"])));
}

#[tokio::test(start_paused = true)]
async fn unsubscribed_query_still_writes_store() {
    let cache = SilentCache::new(MemoryMedium::new());
    let callbacks = Arc::new(AtomicUsize::new(0));
    let counter = callbacks.clone();

    let query = SilentQuery::subscribe(
        &cache,
        "topics",
        delayed_ok(topics(&["a"]), Duration::from_millis(100)),
        QueryOptions::default().on_success(move |_: &Vec<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let state = query.watch();

    query.unsubscribe();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(cache.get::<Vec<String>>("topics"), Some(topics(&["a"])));
    assert_eq!(state.borrow().data, None);
    assert_eq!(state.borrow().status, QueryStatus::Refreshing);
    assert_eq!(callbacks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cached_value_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("cache.sqlite");

    {
        let cache = SilentCache::new(SqliteMedium::open(&db_path).unwrap());
        let mut query = cache.query("topics", || async {
            Ok::<_, FetchError>(vec!["a".to_string(), "b".to_string()])
        });
        query.settled().await;
    }

    let cache = SilentCache::new(SqliteMedium::open(&db_path).unwrap());
    let query = SilentQuery::subscribe(
        &cache,
        "topics",
        || async { Err::<Vec<String>, _>(FetchError::network("offline")) },
        QueryOptions::disabled(),
    );

    let snapshot = query.snapshot();
    assert!(!snapshot.loading);
    assert_eq!(snapshot.status, QueryStatus::ServingCached);
    assert_eq!(snapshot.data, Some(topics(&["a", "b"])));
}

#[tokio::test(start_paused = true)]
async fn quota_failure_does_not_break_refresh() {
    let cache = SilentCache::new(MemoryMedium::new().with_quota(4));

    let mut query = cache.query(
        "topics",
        delayed_ok(topics(&["much too large"]), Duration::from_millis(10)),
    );

    let settled = query.settled().await;
    assert_eq!(settled.data, Some(topics(&["much too large"])));
    assert_eq!(settled.status, QueryStatus::Refreshed);
    assert_eq!(cache.get::<Vec<String>>("topics"), None);
}
