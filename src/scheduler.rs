//! Timer triggers for the two pipeline runs.
//!
//! Crawl fires on startup and then every `crawl_interval_secs`; recompute waits
//! `recompute_delay_secs` before its first tick. Late ticks are skipped, and each
//! loop awaits its run before the next tick, so one loop never overlaps itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::CrawlerConfig;
use crate::pipeline::Pipeline;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub crawl_interval: Duration,
    pub recompute_interval: Duration,
    pub recompute_delay: Duration,
}

impl SchedulerCfg {
    pub fn from_config(cfg: &CrawlerConfig) -> Self {
        Self {
            crawl_interval: Duration::from_secs(cfg.crawl_interval_secs.max(1)),
            recompute_interval: Duration::from_secs(cfg.recompute_interval_secs.max(1)),
            recompute_delay: Duration::from_secs(cfg.recompute_delay_secs),
        }
    }
}

pub fn spawn_crawl_loop(pipeline: Arc<Pipeline>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now(), every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let stats = pipeline.crawl_all().await;
            tracing::debug!(target: "scheduler", inserted = stats.inserted, "crawl tick done");
        }
    })
}

pub fn spawn_recompute_loop(pipeline: Arc<Pipeline>, delay: Duration, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + delay, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = pipeline.recompute_scores().await {
                tracing::error!(target: "scheduler", error = %e, "recompute run failed");
            }
        }
    })
}

/// Both loops; abort the handles to stop them.
pub fn spawn_all(pipeline: Arc<Pipeline>, cfg: SchedulerCfg) -> Vec<JoinHandle<()>> {
    vec![
        spawn_crawl_loop(pipeline.clone(), cfg.crawl_interval),
        spawn_recompute_loop(pipeline, cfg.recompute_delay, cfg.recompute_interval),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_intervals_are_clamped() {
        let cfg = CrawlerConfig {
            crawl_interval_secs: 0,
            recompute_interval_secs: 0,
            recompute_delay_secs: 0,
            ..CrawlerConfig::default()
        };
        let s = SchedulerCfg::from_config(&cfg);
        assert_eq!(s.crawl_interval, Duration::from_secs(1));
        assert_eq!(s.recompute_interval, Duration::from_secs(1));
        assert_eq!(s.recompute_delay, Duration::ZERO);
    }
}
