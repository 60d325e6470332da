//! # Source Registry
//!
//! The list of feeds a crawl polls. Built from configuration only:
//! - entries without a feed address are dropped,
//! - duplicates by domain collapse to the first occurrence (case-insensitive),
//! - credibility is clamped to `[0, 100]`.
//!
//! `default_seed()` carries the built-in AI sources; their feed addresses come
//! from environment variables so a bare deployment polls nothing.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A feed as configured (feed address optional).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub domain: String,
    #[serde(default)]
    pub feed_url: Option<String>,
    #[serde(default = "default_credibility")]
    pub credibility: f64,
}

fn default_credibility() -> f64 {
    50.0
}

/// A feed the crawler will actually poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub domain: String,
    pub feed_url: String,
    pub credibility: f64,
}

/// Pollable sources, deduplicated by domain. Pure; no I/O.
pub fn registry(configured: &[SourceConfig]) -> Vec<Source> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for s in configured {
        let feed_url = match s.feed_url.as_deref().map(str::trim) {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => continue,
        };
        let domain = s.domain.trim().to_ascii_lowercase();
        if !seen.insert(domain.clone()) {
            continue;
        }
        out.push(Source {
            name: s.name.trim().to_string(),
            domain,
            feed_url,
            credibility: clamp_credibility(s.credibility),
        });
    }
    out
}

pub fn clamp_credibility(c: f64) -> f64 {
    if c.is_nan() {
        0.0
    } else {
        c.clamp(0.0, 100.0)
    }
}

/// Built-in AI sources. Feed addresses are read from the environment.
pub fn default_seed() -> Vec<SourceConfig> {
    [
        ("OpenAI Blog", "openai.com", "OPENAI_BLOG_RSS", 95.0),
        ("Google AI Blog", "ai.googleblog.com", "GOOGLE_AI_BLOG_RSS", 92.0),
        ("DeepMind", "deepmind.google", "DEEPMIND_RSS", 92.0),
        ("arXiv cs.AI", "arxiv.org", "ARXIV_CS_AI_RSS", 88.0),
        ("arXiv cs.CL", "arxiv.org", "ARXIV_CS_CL_RSS", 88.0),
        ("arXiv cs.LG", "arxiv.org", "ARXIV_CS_LG_RSS", 88.0),
        ("YouTube Channel", "youtube.com", "YOUTUBE_CHANNEL_RSS", 85.0),
    ]
    .into_iter()
    .map(|(name, domain, env_key, credibility)| SourceConfig {
        name: name.to_string(),
        domain: domain.to_string(),
        feed_url: std::env::var(env_key).ok().filter(|v| !v.trim().is_empty()),
        credibility,
    })
    .collect()
}
