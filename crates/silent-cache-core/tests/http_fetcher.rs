//! `JsonFetcher` against a local HTTP server.

use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use silent_cache::{FetchError, Fetcher, JsonFetcher, MemoryMedium, QueryStatus, SilentCache};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Topic {
    id: u32,
    title: String,
}

async fn spawn_server() -> SocketAddr {
    let app = Router::new()
        .route(
            "/rest/v1/topics",
            get(|headers: HeaderMap| async move {
                if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some("anon-key") {
                    return Err((StatusCode::UNAUTHORIZED, "missing apikey"));
                }
                Ok(Json(vec![
                    Topic {
                        id: 1,
                        title: "Dictation".into(),
                    },
                    Topic {
                        id: 2,
                        title: "Grammar".into(),
                    },
                ]))
            }),
        )
        .route("/broken", get(|| async { (StatusCode::OK, "not json") }))
        .route(
            "/down",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(Vec::<Topic>::new())
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn fetches_and_decodes_json() {
    let addr = spawn_server().await;

    let fetcher = JsonFetcher::<Vec<Topic>>::new(format!("http://{}/rest/v1/topics", addr))
        .unwrap()
        .with_header("apikey", "anon-key")
        .unwrap();

    let topics = fetcher.fetch().await.unwrap();
    assert_eq!(topics.len(), 2);
    assert_eq!(topics[0].title, "Dictation");
}

#[tokio::test]
async fn http_error_status_is_reported() {
    let addr = spawn_server().await;

    let unauthorized = JsonFetcher::<Vec<Topic>>::new(format!("http://{}/rest/v1/topics", addr))
        .unwrap();
    let err = unauthorized.fetch().await.unwrap_err();
    assert_eq!(
        err,
        FetchError::Status {
            status: 401,
            message: "missing apikey".into()
        }
    );
    assert!(!err.is_transient());

    let down = JsonFetcher::<Vec<Topic>>::new(format!("http://{}/down", addr)).unwrap();
    let err = down.fetch().await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 503, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn invalid_body_is_decode_error() {
    let addr = spawn_server().await;

    let fetcher = JsonFetcher::<Vec<Topic>>::new(format!("http://{}/broken", addr)).unwrap();
    let err = fetcher.fetch().await.unwrap_err();
    assert!(matches!(err, FetchError::Decode { .. }));
}

#[tokio::test]
async fn query_revalidates_from_server() {
    let addr = spawn_server().await;
    let cache = SilentCache::new(MemoryMedium::new());
    cache.set(
        "topics",
        &vec![Topic {
            id: 1,
            title: "Old title".into(),
        }],
    );

    let fetcher = JsonFetcher::<Vec<Topic>>::new(format!("http://{}/rest/v1/topics", addr))
        .unwrap()
        .with_header("apikey", "anon-key")
        .unwrap();
    let mut query = cache.query("topics", fetcher);

    assert_eq!(query.snapshot().data.unwrap()[0].title, "Old title");

    let settled = query.settled().await;
    assert_eq!(settled.status, QueryStatus::Refreshed);
    assert_eq!(settled.data.unwrap().len(), 2);
    assert_eq!(cache.get::<Vec<Topic>>("topics").unwrap()[1].title, "Grammar");
}

#[tokio::test]
async fn slow_response_times_out() {
    let addr = spawn_server().await;

    let fetcher = JsonFetcher::<Vec<Topic>>::with_timeout(
        format!("http://{}/slow", addr),
        Duration::from_millis(200),
    )
    .unwrap();

    let err = fetcher.fetch().await.unwrap_err();
    assert_eq!(err, FetchError::Timeout);
    assert!(err.is_transient());
}

#[tokio::test]
async fn timeout_keeps_stale_value() {
    let addr = spawn_server().await;
    let cache = SilentCache::new(MemoryMedium::new());
    let stale = vec![Topic {
        id: 1,
        title: "Old title".into(),
    }];
    cache.set("topics", &stale);

    let fetcher = JsonFetcher::<Vec<Topic>>::with_timeout(
        format!("http://{}/slow", addr),
        Duration::from_millis(200),
    )
    .unwrap();
    let mut query = cache.query("topics", fetcher);

    let settled = query.settled().await;
    assert_eq!(settled.status, QueryStatus::ErroredWithStale);
    assert_eq!(settled.error, Some(FetchError::Timeout));
    assert_eq!(settled.data, Some(stale.clone()));
    assert_eq!(cache.get::<Vec<Topic>>("topics"), Some(stale));
}
