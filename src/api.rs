use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::metrics::Metrics;
use crate::pipeline::{CrawlStats, Pipeline, RecomputeStats};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// Trigger surface: health, on-demand crawl/recompute, and `/metrics` when a
/// recorder is supplied.
pub fn router(state: AppState, metrics: Option<&Metrics>) -> Router {
    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/jobs/crawl", post(run_crawl))
        .route("/jobs/recompute", post(run_recompute))
        .with_state(state);

    match metrics {
        Some(m) => app.merge(m.router()),
        None => app,
    }
}

async fn run_crawl(State(state): State<AppState>) -> Json<CrawlStats> {
    Json(state.pipeline.crawl_all().await)
}

async fn run_recompute(
    State(state): State<AppState>,
) -> Result<Json<RecomputeStats>, (StatusCode, String)> {
    state
        .pipeline
        .recompute_scores()
        .await
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
