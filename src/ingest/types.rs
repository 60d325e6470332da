// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sources::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemType {
    News,
    Paper,
    Video,
    Announcement,
}

impl ItemType {
    /// Fixed domain rules; anything unknown is news.
    pub fn infer_from_domain(domain: &str) -> Self {
        let d = domain.to_ascii_lowercase();
        if d.contains("arxiv.org") {
            ItemType::Paper
        } else if d.contains("youtube.com") || d.contains("youtu.be") {
            ItemType::Video
        } else if d.contains("github.com") {
            ItemType::Announcement
        } else {
            ItemType::News
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::News => "NEWS",
            ItemType::Paper => "PAPER",
            ItemType::Video => "VIDEO",
            ItemType::Announcement => "ANNOUNCEMENT",
        }
    }
}

/// One feed entry after normalization; never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub url: String,
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub item_type: ItemType,
    pub source_name: String,
    pub source_domain: String,
    pub source_credibility: f64,
    pub tags: Vec<String>,
}

impl NormalizedItem {
    /// Both identity fields present and non-blank.
    pub fn is_valid(&self) -> bool {
        !self.url.trim().is_empty() && !self.title.trim().is_empty()
    }
}

/// Retrieves and normalizes one source's feed.
#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<Vec<NormalizedItem>>;
}
