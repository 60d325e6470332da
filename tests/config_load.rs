// tests/config_load.rs
//
// File + env lookup order for CrawlerConfig. Env is process-global, so every
// test here is #[serial].

use std::fs;

use serial_test::serial;
use tempfile::tempdir;

use ai_news_crawler::config::{CrawlerConfig, ENV_CONFIG_PATH};

const ENV_KEYS: &[&str] = &[
    ENV_CONFIG_PATH,
    "BLOCKLIST_PHRASES",
    "SCORE_KEYWORDS",
    "HACKERNEWS_SEARCH_KEYWORDS",
    "FETCH_CONCURRENCY",
    "TZ",
    "BIND_ADDR",
];

fn clear_env() {
    for k in ENV_KEYS {
        std::env::remove_var(k);
    }
}

#[test]
#[serial]
fn env_path_is_loaded_and_overlaid() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("crawler.toml");
    fs::write(
        &path,
        r#"
blocklist = ["from file"]
keywords = ["llm"]
fetch_concurrency = 3

[[sources]]
name = "arXiv cs.AI"
domain = "arxiv.org"
feed_url = "https://rss.arxiv.org/rss/cs.AI"
credibility = 88
"#,
    )
    .unwrap();

    std::env::set_var(ENV_CONFIG_PATH, &path);
    std::env::set_var("BLOCKLIST_PHRASES", "alpha; beta ;");
    std::env::set_var("FETCH_CONCURRENCY", "8");
    let cfg = CrawlerConfig::load_default().unwrap();
    clear_env();

    assert_eq!(cfg.sources.len(), 1);
    assert_eq!(cfg.sources[0].domain, "arxiv.org");
    assert_eq!(cfg.blocklist, vec!["alpha".to_string(), "beta".to_string()]);
    assert_eq!(cfg.keywords, vec!["llm".to_string()]);
    assert_eq!(cfg.fetch_concurrency, 8);
}

#[test]
#[serial]
fn missing_env_path_is_an_error() {
    clear_env();
    let dir = tempdir().unwrap();
    std::env::set_var(ENV_CONFIG_PATH, dir.path().join("nope.toml"));
    let res = CrawlerConfig::load_default();
    clear_env();
    assert!(res.is_err());
}

#[test]
#[serial]
fn keywords_fall_back_to_search_keywords_variable() {
    clear_env();
    std::env::set_var("HACKERNEWS_SEARCH_KEYWORDS", "agents, rag ,");
    let mut cfg = CrawlerConfig::default();
    cfg.apply_env();
    clear_env();
    assert_eq!(cfg.keywords, vec!["agents".to_string(), "rag".to_string()]);
}

#[test]
#[serial]
fn invalid_toml_is_reported() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "sources = 12").unwrap();
    assert!(CrawlerConfig::load_from(&path).is_err());
}
