// src/config.rs
//! Crawler configuration.
//!
//! Lookup order:
//! 1) `$CRAWLER_CONFIG_PATH` (must exist)
//! 2) `config/crawler.toml`
//! 3) built-in defaults (`sources::default_seed()`)
//!
//! After the file, environment variables override individual settings:
//! `BLOCKLIST_PHRASES` (`;`), `SCORE_KEYWORDS` / `HACKERNEWS_SEARCH_KEYWORDS` (`,`),
//! `FETCH_CONCURRENCY`, `TZ`, `BIND_ADDR`.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::sources::{self, SourceConfig};

pub const ENV_CONFIG_PATH: &str = "CRAWLER_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/crawler.toml";

/// Reprint-prohibition notices that mark content we may not republish.
pub const DEFAULT_BLOCKLIST: &str = "未经允许,禁止转载;不得转载;版权所有 未经授权不得转载;禁止转载";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub sources: Vec<SourceConfig>,
    pub blocklist: Vec<String>,
    pub keywords: Vec<String>,
    pub fetch_concurrency: usize,
    pub fetch_timeout_secs: u64,
    pub day_key_timezone: String,
    pub crawl_interval_secs: u64,
    pub recompute_interval_secs: u64,
    pub recompute_delay_secs: u64,
    pub bind_addr: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            sources: sources::default_seed(),
            blocklist: split_list(DEFAULT_BLOCKLIST, ';'),
            keywords: Vec::new(),
            fetch_concurrency: 5,
            fetch_timeout_secs: crate::ingest::http::DEFAULT_FETCH_TIMEOUT_SECS,
            day_key_timezone: "America/New_York".to_string(),
            crawl_interval_secs: 6 * 3600,
            recompute_interval_secs: 6 * 3600,
            recompute_delay_secs: 3600,
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl CrawlerConfig {
    /// Load from an explicit TOML path (no env overlay).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading crawler config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: CrawlerConfig = toml::from_str(s).context("parsing crawler config")?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Env path, then `config/crawler.toml`, then defaults; env overlay on top.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                Self::load_from(&default_path)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("BLOCKLIST_PHRASES") {
            self.blocklist = split_list(&v, ';');
        }
        if let Ok(v) = std::env::var("SCORE_KEYWORDS").or_else(|_| std::env::var("HACKERNEWS_SEARCH_KEYWORDS")) {
            self.keywords = split_list(&v, ',');
        }
        if let Some(n) = std::env::var("FETCH_CONCURRENCY").ok().and_then(|v| v.trim().parse().ok()) {
            self.fetch_concurrency = n;
        }
        if let Ok(tz) = std::env::var("TZ") {
            if !tz.trim().is_empty() {
                self.day_key_timezone = tz.trim().to_string();
            }
        }
        if let Ok(addr) = std::env::var("BIND_ADDR") {
            if !addr.trim().is_empty() {
                self.bind_addr = addr.trim().to_string();
            }
        }
        self.sanitize();
    }

    fn sanitize(&mut self) {
        self.fetch_concurrency = self.fetch_concurrency.max(1);
        if self.fetch_timeout_secs == 0 {
            self.fetch_timeout_secs = crate::ingest::http::DEFAULT_FETCH_TIMEOUT_SECS;
        }
        self.blocklist = clean_list(std::mem::take(&mut self.blocklist));
        self.keywords = clean_list(std::mem::take(&mut self.keywords));
        for s in &mut self.sources {
            s.credibility = sources::clamp_credibility(s.credibility);
        }
    }
}

/// Split on `sep`, trim, drop empties, keep order.
pub fn split_list(raw: &str, sep: char) -> Vec<String> {
    clean_list(raw.split(sep).map(str::to_string).collect())
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}
