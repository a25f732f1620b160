// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod backfill;
pub mod cache;
pub mod config;
pub mod controller;
pub mod delivery;
pub mod feed;
pub mod history;
pub mod matcher;
pub mod metrics;
pub mod monitor;
pub mod observer;
pub mod scheduler;
pub mod state;

// ---- Re-exports for stable public API ----
pub use crate::controller::{Controller, ScanMode, ScanReport};
pub use crate::feed::{FeedItem, FeedSource};
pub use crate::matcher::{MatchMode, MatchRules};
pub use crate::monitor::{Monitor, SessionCfg};
pub use crate::state::{MonitorState, StateStore};

use std::sync::Arc;

use crate::config::MonitorConfig;
use crate::delivery::{Deliver, DryRunSink, HttpDelivery};
use crate::history::RecentDeliveries;
use crate::state::KvStore;

/// Build a controller for `cfg` on top of `kv`. `dry_run` swaps the HTTP
/// delivery client for a logging sink.
pub async fn build_controller(
    cfg: &MonitorConfig,
    kv: Arc<dyn KvStore>,
    history: Arc<RecentDeliveries>,
    dry_run: bool,
) -> anyhow::Result<Controller> {
    let rules = cfg.match_rules()?;
    let sink: Arc<dyn Deliver> = if dry_run {
        Arc::new(DryRunSink)
    } else {
        Arc::new(HttpDelivery::new(&cfg.api_base, &cfg.topic).with_timeout(cfg.delivery_timeout_secs))
    };
    let store = StateStore::new(kv, &cfg.feed_key());
    Ok(
        Controller::attach(rules, sink, store, history, cfg.max_cache_size)
            .await
            .with_threshold_minutes(cfg.catch_up_threshold_minutes),
    )
}

pub fn session_cfg(cfg: &MonitorConfig) -> SessionCfg {
    SessionCfg {
        debounce: cfg.debounce(),
        initial_delay: cfg.initial_delay(),
        refresh: cfg.scheduler_cfg().refresh,
        backfill: cfg.backfill_cfg(),
    }
}
