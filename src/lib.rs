// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod cluster;
pub mod config;
pub mod dedup;
pub mod fingerprint;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;
pub mod score;
pub mod sources;
pub mod store;

pub use crate::api::router;
pub use crate::pipeline::{CrawlStats, IngestOutcome, Pipeline, RecomputeStats};
