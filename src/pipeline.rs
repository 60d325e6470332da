//! Pipeline orchestrator: the two entry points a trigger calls.
//!
//! - `crawl_all`: upsert sources, fetch feeds through a bounded pool, then per item
//!   fingerprint → dedup/revision → score → cluster.
//! - `recompute_scores`: rescore the recent window, writing only the score field.
//!
//! Per-source and per-item failures are folded into the run statistics; they never
//! abort the run.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use futures::stream::{self, StreamExt};
use metrics::{counter, gauge};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cluster::{assign_cluster, ClusterParams};
use crate::config::CrawlerConfig;
use crate::dedup::{comparison_text, decide, BlockList, SkipReason, Verdict, DEFAULT_DUPLICATE_THRESHOLD};
use crate::fingerprint::{day_key, parse_timezone, simhash64, url_hash};
use crate::ingest::ensure_metrics_described;
use crate::ingest::types::{FeedFetcher, NormalizedItem};
use crate::score::{ScoreInputs, Scorer, DEFAULT_HALF_LIFE_HOURS};
use crate::sources::{self, Source, SourceConfig};
use crate::store::{ClusterLink, Item, ItemFields, ItemUpdate, Store, StoreError};

/// Attempts per item when a concurrent writer wins the url-hash or revision race.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Fixed policy constants.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub duplicate_distance: u32,
    pub cluster: ClusterParams,
    pub half_life_hours: f64,
    pub recompute_window: Duration,
    pub recompute_batch: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            duplicate_distance: DEFAULT_DUPLICATE_THRESHOLD,
            cluster: ClusterParams::default(),
            half_life_hours: DEFAULT_HALF_LIFE_HOURS,
            recompute_window: Duration::days(7),
            recompute_batch: 1000,
        }
    }
}

/// Counters returned by a crawl run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrawlStats {
    pub sources: usize,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub skipped_blocked: usize,
    pub skipped_duplicate: usize,
    pub skipped_stale: usize,
    pub clusters_linked: usize,
    pub source_errors: usize,
    pub item_errors: usize,
}

impl CrawlStats {
    fn merge(&mut self, other: CrawlStats) {
        self.fetched += other.fetched;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.skipped_blocked += other.skipped_blocked;
        self.skipped_duplicate += other.skipped_duplicate;
        self.skipped_stale += other.skipped_stale;
        self.clusters_linked += other.clusters_linked;
        self.source_errors += other.source_errors;
        self.item_errors += other.item_errors;
    }

    fn record(&mut self, outcome: &IngestOutcome) {
        match outcome {
            IngestOutcome::Inserted(a) => {
                self.inserted += 1;
                self.record_accepted(a);
            }
            IngestOutcome::Updated(a) => {
                self.updated += 1;
                self.record_accepted(a);
            }
            IngestOutcome::Skipped(reason) => {
                self.skipped += 1;
                match reason {
                    SkipReason::Blocked => self.skipped_blocked += 1,
                    SkipReason::Duplicate => self.skipped_duplicate += 1,
                    SkipReason::Stale => self.skipped_stale += 1,
                }
            }
            IngestOutcome::Dropped => {}
            IngestOutcome::Failed(_) => self.item_errors += 1,
        }
    }

    fn record_accepted(&mut self, a: &Accepted) {
        if matches!(a.cluster, Some(ClusterLink::Created(_) | ClusterLink::Joined(_))) {
            self.clusters_linked += 1;
        }
        if a.follow_up_error.is_some() {
            self.item_errors += 1;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecomputeStats {
    pub touched: usize,
    pub failed: usize,
}

/// An item that was written (inserted or revised).
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub item_id: Uuid,
    pub revision: u32,
    pub score: Option<f64>,
    pub cluster: Option<ClusterLink>,
    /// Score or cluster write that failed after the item itself was stored.
    pub follow_up_error: Option<String>,
}

/// What happened to one normalized item.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Inserted(Accepted),
    Updated(Accepted),
    Skipped(SkipReason),
    /// Failed validation; not counted anywhere.
    Dropped,
    Failed(String),
}

/// Crawl/recompute orchestrator. Owns no global state; everything it touches is
/// injected at construction.
pub struct Pipeline {
    store: Arc<dyn Store>,
    fetcher: Arc<dyn FeedFetcher>,
    sources: Vec<SourceConfig>,
    blocklist: BlockList,
    keywords: Vec<String>,
    scorer: Scorer,
    tz: Tz,
    concurrency: usize,
    thresholds: Thresholds,
}

impl Pipeline {
    pub fn new(store: Arc<dyn Store>, fetcher: Arc<dyn FeedFetcher>, cfg: &CrawlerConfig) -> Self {
        let thresholds = Thresholds::default();
        Self {
            store,
            fetcher,
            sources: cfg.sources.clone(),
            blocklist: BlockList::new(cfg.blocklist.as_slice()),
            keywords: cfg.keywords.clone(),
            scorer: Scorer::new(cfg.keywords.as_slice(), thresholds.half_life_hours),
            tz: parse_timezone(&cfg.day_key_timezone),
            concurrency: cfg.fetch_concurrency.max(1),
            thresholds,
        }
    }

    /// Replace the policy constants; the scorer is rebuilt for the new half-life.
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.scorer = Scorer::new(self.keywords.as_slice(), thresholds.half_life_hours);
        self.thresholds = thresholds;
        self
    }

    pub fn sources(&self) -> Vec<Source> {
        sources::registry(&self.sources)
    }

    pub async fn crawl_all(&self) -> CrawlStats {
        self.crawl_all_at(Utc::now()).await
    }

    /// Crawl with an explicit clock; `now` anchors scoring and the cluster window.
    pub async fn crawl_all_at(&self, now: DateTime<Utc>) -> CrawlStats {
        ensure_metrics_described();
        counter!("crawl_runs_total").increment(1);

        let registry = self.sources();
        info!(sources = registry.len(), concurrency = self.concurrency, "crawl started");
        let mut stats = CrawlStats {
            sources: registry.len(),
            ..CrawlStats::default()
        };

        for s in &registry {
            if let Err(e) = self
                .store
                .upsert_source(&s.domain, &s.name, Some(&s.feed_url), s.credibility)
                .await
            {
                warn!(domain = %s.domain, error = %e, "upsert source failed");
            }
        }

        let per_source: Vec<CrawlStats> = stream::iter(registry)
            .map(|src| async move { self.crawl_source(&src, now).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        for s in per_source {
            stats.merge(s);
        }

        counter!("crawl_items_fetched_total").increment(stats.fetched as u64);
        counter!("crawl_items_inserted_total").increment(stats.inserted as u64);
        counter!("crawl_items_updated_total").increment(stats.updated as u64);
        counter!("crawl_items_skipped_total", "reason" => "blocked").increment(stats.skipped_blocked as u64);
        counter!("crawl_items_skipped_total", "reason" => "duplicate").increment(stats.skipped_duplicate as u64);
        counter!("crawl_items_skipped_total", "reason" => "stale").increment(stats.skipped_stale as u64);
        counter!("crawl_item_errors_total").increment(stats.item_errors as u64);
        counter!("crawl_clusters_linked_total").increment(stats.clusters_linked as u64);
        gauge!("crawl_last_run_ts").set(Utc::now().timestamp() as f64);

        info!(
            sources = stats.sources,
            fetched = stats.fetched,
            inserted = stats.inserted,
            updated = stats.updated,
            skipped = stats.skipped,
            clusters_linked = stats.clusters_linked,
            source_errors = stats.source_errors,
            item_errors = stats.item_errors,
            "crawl finished"
        );
        stats
    }

    async fn crawl_source(&self, src: &Source, now: DateTime<Utc>) -> CrawlStats {
        let mut stats = CrawlStats::default();
        let items = match self.fetcher.fetch(src).await {
            Ok(items) => items,
            Err(e) => {
                warn!(source = %src.name, feed = %src.feed_url, error = %format!("{e:#}"), "fetch source failed");
                counter!("crawl_source_errors_total").increment(1);
                stats.source_errors += 1;
                return stats;
            }
        };
        stats.fetched = items.len();
        debug!(source = %src.name, items = items.len(), "feed fetched");

        for item in items {
            let outcome = self.ingest_item(item, now).await;
            stats.record(&outcome);
        }
        stats
    }

    /// Run one normalized item through fingerprint → dedup → write → score → cluster.
    pub async fn ingest_item(&self, item: NormalizedItem, now: DateTime<Utc>) -> IngestOutcome {
        if !item.is_valid() {
            debug!(url = %item.url, "missing url or title, dropping");
            return IngestOutcome::Dropped;
        }
        if self.blocklist.blocks(&item) {
            debug!(url = %item.url, "blocked phrase, skipping");
            return IngestOutcome::Skipped(SkipReason::Blocked);
        }

        let hash = url_hash(&item.url);
        let simhash = simhash64(&comparison_text(&item.title, item.summary.as_deref()));
        let fields = ItemFields {
            url: item.url.clone(),
            title: item.title.clone(),
            summary: item.summary.clone(),
            content: item.content.clone(),
            image_url: item.image_url.clone(),
            source_name: item.source_name.clone(),
            source_domain: item.source_domain.clone(),
            source_credibility: item.source_credibility,
            item_type: item.item_type,
            tags: item.tags.clone(),
            published_at: item.published_at,
            day_key: day_key(item.published_at, self.tz),
            simhash: Some(simhash.clone()),
        };

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let existing = match self.store.find_item_by_url_hash(&hash).await {
                Ok(e) => e,
                Err(e) => return self.fail(&hash, e),
            };

            let written = match decide(existing.as_ref(), &item, &simhash, self.thresholds.duplicate_distance) {
                Verdict::Skip(reason) => {
                    debug!(url_hash = %hash, reason = reason.as_str(), "item skipped");
                    return IngestOutcome::Skipped(reason);
                }
                Verdict::Insert => self
                    .store
                    .create_item(&hash, fields.clone())
                    .await
                    .map(|it| (it, false)),
                Verdict::Revise { expected_revision } => {
                    let Some(existing) = existing.as_ref() else {
                        continue;
                    };
                    self.store
                        .update_item(
                            existing.id,
                            ItemUpdate::Revise {
                                fields: Box::new(fields.clone()),
                                expected_revision,
                            },
                        )
                        .await
                        .map(|it| (it, true))
                }
            };

            match written {
                Ok((stored, revised)) => {
                    let accepted = self.score_and_cluster(&stored, now).await;
                    return if revised {
                        IngestOutcome::Updated(accepted)
                    } else {
                        IngestOutcome::Inserted(accepted)
                    };
                }
                Err(e) if e.is_conflict() => {
                    debug!(url_hash = %hash, attempt, error = %e, "write race, re-deciding");
                }
                Err(e) => return self.fail(&hash, e),
            }
        }
        self.fail(
            &hash,
            StoreError::Backend(format!("gave up after {MAX_WRITE_ATTEMPTS} conflicting writes")),
        )
    }

    fn fail(&self, hash: &str, e: StoreError) -> IngestOutcome {
        error!(url_hash = %hash, error = %e, "item write failed");
        IngestOutcome::Failed(e.to_string())
    }

    async fn score_and_cluster(&self, item: &Item, now: DateTime<Utc>) -> Accepted {
        let mut accepted = Accepted {
            item_id: item.id,
            revision: item.revision,
            score: None,
            cluster: None,
            follow_up_error: None,
        };

        let score = self.scorer.score(&score_inputs(item), now);
        match self.store.update_item(item.id, ItemUpdate::Score(score)).await {
            Ok(_) => accepted.score = Some(score),
            Err(e) => {
                error!(url_hash = %item.url_hash, error = %e, "score write failed");
                accepted.follow_up_error = Some(e.to_string());
            }
        }

        if let Some(sig) = item.fields.simhash.as_deref() {
            match assign_cluster(
                self.store.as_ref(),
                &self.thresholds.cluster,
                item.id,
                sig,
                item.fields.item_type,
                now,
            )
            .await
            {
                Ok(link) => accepted.cluster = link,
                Err(e) => {
                    error!(url_hash = %item.url_hash, error = %e, "cluster link failed");
                    accepted.follow_up_error.get_or_insert(e.to_string());
                }
            }
        }
        accepted
    }

    pub async fn recompute_scores(&self) -> Result<RecomputeStats, StoreError> {
        self.recompute_scores_at(Utc::now()).await
    }

    /// Rescore the trailing window. Only a failing batch read aborts the run.
    pub async fn recompute_scores_at(&self, now: DateTime<Utc>) -> Result<RecomputeStats, StoreError> {
        ensure_metrics_described();
        let since = now - self.thresholds.recompute_window;
        let rows = self
            .store
            .find_recent_items(since, self.thresholds.recompute_batch)
            .await?;

        let mut stats = RecomputeStats::default();
        for row in &rows {
            let score = self.scorer.score(
                &ScoreInputs {
                    published_at: row.published_at,
                    credibility: row.source_credibility,
                    title: &row.title,
                    summary: row.summary.as_deref(),
                    likes: row.social_likes,
                    comments: row.social_comments,
                    views: row.social_views,
                },
                now,
            );
            match self.store.update_item(row.id, ItemUpdate::Score(score)).await {
                Ok(_) => stats.touched += 1,
                Err(e) => {
                    warn!(item = %row.id, error = %e, "score write failed");
                    stats.failed += 1;
                }
            }
        }

        counter!("recompute_items_total").increment(stats.touched as u64);
        gauge!("recompute_last_run_ts").set(Utc::now().timestamp() as f64);
        info!(touched = stats.touched, failed = stats.failed, "recompute scores finished");
        Ok(stats)
    }
}

fn score_inputs(item: &Item) -> ScoreInputs<'_> {
    ScoreInputs {
        published_at: item.fields.published_at,
        credibility: item.fields.source_credibility,
        title: &item.fields.title,
        summary: item.fields.summary.as_deref(),
        likes: item.social_likes,
        comments: item.social_comments,
        views: item.social_views,
    }
}
