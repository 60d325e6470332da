use axum::{routing::get, Router};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::ingest::ensure_metrics_described;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register crawler series.
    pub fn init() -> Result<Self, BuildError> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Like `init`, but falls back to a detached recorder when a global one is
    /// already installed (tests install many times per process).
    pub fn init_or_detached() -> Self {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                ensure_metrics_described();
                Self { handle }
            }
            Err(_) => Self {
                handle: PrometheusBuilder::new().build_recorder().handle(),
            },
        }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
