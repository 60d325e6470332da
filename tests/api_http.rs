// tests/api_http.rs
//
// HTTP-level tests for the trigger Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::Value as Json;
use tower::ServiceExt as _;

use ai_news_crawler::api::{self, AppState};
use ai_news_crawler::config::CrawlerConfig;
use ai_news_crawler::ingest::types::{FeedFetcher, ItemType, NormalizedItem};
use ai_news_crawler::metrics::Metrics;
use ai_news_crawler::pipeline::Pipeline;
use ai_news_crawler::sources::{Source, SourceConfig};
use ai_news_crawler::store::MemoryStore;

const BODY_LIMIT: usize = 1024 * 1024;

/// One fresh item per source, keyed by the source domain.
struct OneItemFetcher;

#[async_trait]
impl FeedFetcher for OneItemFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<NormalizedItem>> {
        Ok(vec![NormalizedItem {
            url: format!("https://{}/post", source.domain),
            title: format!("{} announces a new model", source.name),
            summary: None,
            content: None,
            image_url: None,
            published_at: Utc::now(),
            item_type: ItemType::Announcement,
            source_name: source.name.clone(),
            source_domain: source.domain.clone(),
            source_credibility: source.credibility,
            tags: vec![],
        }])
    }
}

fn test_router(metrics: Option<&Metrics>) -> (Arc<MemoryStore>, Router) {
    let store = Arc::new(MemoryStore::new());
    let cfg = CrawlerConfig {
        sources: vec![SourceConfig {
            name: "Lab".into(),
            domain: "lab.example".into(),
            feed_url: Some("https://lab.example/rss".into()),
            credibility: 90.0,
        }],
        ..CrawlerConfig::default()
    };
    let pipeline = Arc::new(Pipeline::new(store.clone(), Arc::new(OneItemFetcher), &cfg));
    (store, api::router(AppState { pipeline }, metrics))
}

async fn body_string(resp: axum::response::Response) -> String {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    String::from_utf8(bytes).expect("utf8")
}

#[tokio::test]
async fn health_returns_ok() {
    let (_, app) = test_router(None);
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "OK");
}

#[tokio::test]
async fn crawl_trigger_runs_pipeline_and_returns_stats() {
    let (store, app) = test_router(None);
    let resp = app
        .oneshot(Request::post("/jobs/crawl").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let v: Json = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(v["sources"], 1);
    assert_eq!(v["fetched"], 1);
    assert_eq!(v["inserted"], 1);
    assert_eq!(store.item_count(), 1);
}

#[tokio::test]
async fn recompute_trigger_touches_recent_items() {
    let (_, app) = test_router(None);
    let resp = app
        .clone()
        .oneshot(Request::post("/jobs/crawl").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(Request::post("/jobs/recompute").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v: Json = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(v["touched"], 1);
}

#[tokio::test]
async fn jobs_reject_get() {
    let (_, app) = test_router(None);
    let resp = app
        .oneshot(Request::get("/jobs/crawl").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn metrics_route_only_when_recorder_supplied() {
    let (_, app) = test_router(None);
    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let metrics = Metrics::init_or_detached();
    let (_, app) = test_router(Some(&metrics));
    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
