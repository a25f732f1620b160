use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if one is already installed.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe_all();
        Ok(Self { handle })
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
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

/// One-time metrics registration (so series show up on /metrics).
pub fn describe_all() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("monitor_scans_total", "Controller runs, by mode.");
        describe_counter!("monitor_delivered_total", "Items handed to the delivery client.");
        describe_counter!("monitor_dedup_total", "Items skipped by the fingerprint cache.");
        describe_counter!("monitor_unmatched_total", "Items rejected by the keyword rules.");
        describe_counter!("monitor_delivery_ok_total", "Ingest requests answered with 2xx.");
        describe_counter!(
            "monitor_delivery_failed_total",
            "Ingest requests that failed or returned non-2xx."
        );
        describe_counter!("monitor_backfill_total", "Backfill runs, by outcome.");
        describe_counter!("monitor_reloads_total", "Full feed reloads.");
        describe_gauge!("monitor_last_run_ts", "Unix ts when the controller last ran.");
        describe_gauge!("monitor_cache_size", "Fingerprints currently cached.");
        describe_histogram!("monitor_backfill_steps", "Pagination steps per backfill.");
    });
}
