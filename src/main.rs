//! AI news crawler: binary entrypoint.
//! Loads config, wires store + fetcher into the pipeline, spawns the timer loops,
//! and serves the trigger endpoints until Ctrl-C / SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ai_news_crawler::api::{self, AppState};
use ai_news_crawler::config::CrawlerConfig;
use ai_news_crawler::ingest::http::HttpFeedFetcher;
use ai_news_crawler::metrics::Metrics;
use ai_news_crawler::pipeline::Pipeline;
use ai_news_crawler::scheduler::{self, SchedulerCfg};
use ai_news_crawler::store::MemoryStore;

/// `LOG_FORMAT=json` switches to JSON lines; otherwise compact text.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ai_news_crawler=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; absent in most deployments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = CrawlerConfig::load_default().context("loading crawler config")?;
    tracing::info!(
        sources = cfg.sources.len(),
        concurrency = cfg.fetch_concurrency,
        tz = %cfg.day_key_timezone,
        "config loaded"
    );

    let metrics = Metrics::init().context("installing prometheus recorder")?;
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(HttpFeedFetcher::new(Duration::from_secs(cfg.fetch_timeout_secs))?);
    let pipeline = Arc::new(Pipeline::new(store, fetcher, &cfg));

    let loops = scheduler::spawn_all(pipeline.clone(), SchedulerCfg::from_config(&cfg));

    let app = api::router(AppState { pipeline }, Some(&metrics));
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    tracing::info!(addr = %cfg.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_signal())
        .await
        .context("serving http")?;

    for h in loops {
        h.abort();
    }
    tracing::info!("shut down");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
