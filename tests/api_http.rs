// tests/api_http.rs
//
// HTTP-level tests for the Router without opening sockets, via
// tower::ServiceExt::oneshot. Storage is a real SQLite file in a tempdir.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::Value as Json;
use tokio::sync::Notify;
use tower::ServiceExt as _; // for `oneshot`

use ai_news_collector::api::{self, AppState};
use ai_news_collector::ingest::types::{MediaType, NewsItem, Source};
use ai_news_collector::job::JobTracker;
use ai_news_collector::pipeline::{CollectionRun, ProgressFn};
use ai_news_collector::store::{NewsStore, SqliteStore};

const BODY_LIMIT: usize = 1024 * 1024;

struct ParkedRun {
    gate: Arc<Notify>,
}

#[async_trait]
impl CollectionRun for ParkedRun {
    async fn run(&self, _progress: ProgressFn<'_>) -> anyhow::Result<usize> {
        self.gate.notified().await;
        Ok(0)
    }
}

struct Harness {
    app: Router,
    store: Arc<SqliteStore>,
    tracker: Arc<JobTracker>,
    gate: Arc<Notify>,
    _dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("news.db");
    let store = Arc::new(SqliteStore::open(db.to_str().unwrap()).await.unwrap());
    let gate = Arc::new(Notify::new());
    let tracker = Arc::new(
        JobTracker::new(
            Arc::new(ParkedRun { gate: gate.clone() }),
            dir.path().join("meta.json"),
        )
        .with_day_fn(|| "2025-03-01".to_string()),
    );
    let app = api::router(AppState {
        store: store.clone(),
        tracker: tracker.clone(),
    });
    Harness {
        app,
        store,
        tracker,
        gate,
        _dir: dir,
    }
}

fn item(source: Source, url: &str, thumb: Option<&str>) -> NewsItem {
    NewsItem {
        title: format!("title {url}"),
        content: "content".into(),
        summary: "summary".into(),
        source,
        source_url: url.into(),
        embed_url: None,
        media_type: MediaType::Video,
        published_at: Utc::now(),
        thumbnail_url: thumb.map(str::to_string),
        extras: Default::default(),
    }
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let v = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, v)
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness().await;
    let (status, v) = call(&h.app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "ok");
    assert!(v["time"].is_string());
}

#[tokio::test]
async fn news_list_pages_and_filters_by_source() {
    let h = harness().await;
    for i in 0..3 {
        h.store
            .insert(&item(Source::Bilibili, &format!("https://b/{i}"), None))
            .await
            .unwrap();
    }
    h.store
        .insert(&item(Source::Github, "https://g/1", None))
        .await
        .unwrap();

    let (status, v) = call(&h.app, "GET", "/api/news?page=1&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["total"], 4);
    assert_eq!(v["page"], 1);
    assert_eq!(v["limit"], 2);
    assert_eq!(v["totalPages"], 2);
    assert_eq!(v["items"].as_array().unwrap().len(), 2);

    let (_, v) = call(&h.app, "GET", "/api/news?source=github").await;
    assert_eq!(v["total"], 1);
    assert_eq!(v["items"][0]["source"], "github");
    assert_eq!(v["items"][0]["source_url"], "https://g/1");

    let (status, _) = call(&h.app, "GET", "/api/news?source=myspace").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn news_by_id_normalizes_thumbnail_and_404s() {
    let h = harness().await;
    let id = h
        .store
        .insert(&item(
            Source::Bilibili,
            "https://www.bilibili.com/video/BV1",
            Some("https://i0.hdslb.com/bfs/archive/x.jpg@672w_378h_1c.webp"),
        ))
        .await
        .unwrap();

    let (status, v) = call(&h.app, "GET", &format!("/api/news/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["id"], id);
    assert_eq!(v["thumbnail"], "https://i0.hdslb.com/bfs/archive/x.jpg");

    let (status, v) = call(&h.app, "GET", "/api/news/424242").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(v["error"], "Not found");
}

#[tokio::test]
async fn today_lists_items_collected_since_midnight() {
    let h = harness().await;
    h.store
        .insert(&item(Source::Youtube, "https://y/1", None))
        .await
        .unwrap();
    let (status, v) = call(&h.app, "GET", "/api/news/today").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["total"], 1);
    assert_eq!(v["items"][0]["source"], "youtube");
}

#[tokio::test]
async fn collect_trigger_maps_codes_to_statuses() {
    let h = harness().await;

    let (status, v) = call(&h.app, "POST", "/api/news/collect").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(v["ok"], true);
    assert_eq!(v["code"], "STARTED");

    let (status, v) = call(&h.app, "POST", "/api/news/collect").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["code"], "ALREADY_RUNNING");
    assert_eq!(v["status"]["running"], true);

    let (status, v) = call(&h.app, "GET", "/api/news/collect/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["running"], true);
    assert_eq!(v["day"], "2025-03-01");

    // Let the spawned run park first so the wakeup is not lost.
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.gate.notify_one();
    for _ in 0..500 {
        if !h.tracker.status().running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let (status, v) = call(&h.app, "POST", "/api/news/collect").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(v["ok"], false);
    assert_eq!(v["code"], "ALREADY_COLLECTED_TODAY");
    assert_eq!(v["status"]["collectedToday"], true);
}
