// src/ingest/mod.rs
pub mod http;
pub mod rss;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("crawl_runs_total", "Crawl runs started.");
        describe_counter!(
            "crawl_items_fetched_total",
            "Items normalized from all feeds."
        );
        describe_counter!("crawl_items_inserted_total", "New items persisted.");
        describe_counter!(
            "crawl_items_updated_total",
            "Existing items revised in place."
        );
        describe_counter!(
            "crawl_items_skipped_total",
            "Items discarded (reason=blocked|duplicate|stale)."
        );
        describe_counter!(
            "crawl_entries_dropped_total",
            "Feed entries without link or title."
        );
        describe_counter!(
            "crawl_source_errors_total",
            "Feed fetch/parse failures."
        );
        describe_counter!(
            "crawl_item_errors_total",
            "Per-item storage failures."
        );
        describe_counter!(
            "crawl_clusters_linked_total",
            "Items attached to a cluster."
        );
        describe_counter!("recompute_items_total", "Items rescored.");
        describe_histogram!("crawl_fetch_ms", "Feed download time in milliseconds.");
        describe_histogram!("crawl_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("crawl_last_run_ts", "Unix ts when a crawl last finished.");
        describe_gauge!(
            "recompute_last_run_ts",
            "Unix ts when a recompute last finished."
        );
    });
}

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));
static RE_IMG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#).expect("img regex"));

/// Plain-text rendition of a feed field: decode entities, strip tags, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    // 1) HTML entity decode
    let decoded = html_escape::decode_html_entities(s);

    // 2) Strip HTML tags
    let stripped = RE_TAGS.replace_all(&decoded, " ");

    // 3) Normalize “ ” ‘ ’ to ASCII quotes
    let quoted = stripped
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    RE_WS.replace_all(&quoted, " ").trim().to_string()
}

/// `src` of the first `<img>` in an HTML fragment.
pub fn first_img_src(html: &str) -> Option<String> {
    RE_IMG
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
