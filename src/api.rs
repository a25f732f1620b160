use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::controller::Controller;
use crate::history::{DeliveredEntry, RecentDeliveries};
use crate::metrics::Metrics;
use crate::state::MonitorState;

#[derive(Clone)]
pub struct AppState {
    pub monitor: String,
    pub controller: Arc<Controller>,
    pub history: Arc<RecentDeliveries>,
}

/// Read-only status surface: health, recent deliveries, monitor state and,
/// when a recorder is installed, `/metrics`.
pub fn router(state: AppState, metrics: Option<&Metrics>) -> Router {
    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/recent", get(recent))
        .route("/api/state", get(monitor_state))
        .layer(CorsLayer::very_permissive())
        .with_state(state);

    match metrics {
        Some(m) => app.merge(m.router()),
        None => app,
    }
}

#[derive(serde::Deserialize)]
struct RecentQuery {
    #[serde(default)]
    limit: Option<usize>,
}

async fn recent(
    State(state): State<AppState>,
    Query(q): Query<RecentQuery>,
) -> Json<Vec<DeliveredEntry>> {
    let n = q.limit.unwrap_or(20).min(500);
    Json(state.history.snapshot_last_n(n))
}

#[derive(serde::Serialize)]
struct StateOut {
    monitor: String,
    mode: &'static str,
    cached: usize,
    #[serde(flatten)]
    state: MonitorState,
}

async fn monitor_state(State(state): State<AppState>) -> Json<StateOut> {
    let ctl = &state.controller;
    Json(StateOut {
        monitor: state.monitor.clone(),
        mode: ctl.rules().mode().as_str(),
        cached: ctl.cache_len().await,
        state: ctl.state().await,
    })
}

/// Bind and serve in the background.
pub async fn serve(addr: &str, app: Router) -> Result<tokio::task::JoinHandle<()>> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding status surface on {addr}"))?;
    tracing::info!(addr = %addr, "status surface listening");
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::warn!("status surface stopped: {e:#}");
        }
    }))
}
