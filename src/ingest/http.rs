// src/ingest/http.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::histogram;
use std::time::Duration;

use crate::ingest::rss::parse_feed;
use crate::ingest::types::{FeedFetcher, NormalizedItem};
use crate::sources::Source;

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;

/// Fetches feeds over HTTP with a hard per-request timeout.
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ai-news-crawler/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building feed http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<NormalizedItem>> {
        let t0 = std::time::Instant::now();
        let resp = self
            .client
            .get(&source.feed_url)
            .send()
            .await
            .with_context(|| format!("GET {}", source.feed_url))?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("GET {} returned {status}", source.feed_url);
        }
        let body = resp.text().await.context("reading feed body")?;
        histogram!("crawl_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        parse_feed(&body, source, chrono::Utc::now())
    }
}
