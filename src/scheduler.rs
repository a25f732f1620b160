// src/scheduler.rs
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::feed::FeedSource;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub heartbeat: Duration,
    pub refresh: Duration,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(30),
            refresh: Duration::from_secs(60),
        }
    }
}

/// Liveness line on a fixed interval. Operational signal only.
pub fn spawn_heartbeat(every: Duration, monitor: String, watching: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick completes immediately; the first line goes out one period in.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            tracing::info!(
                target: "scheduler",
                monitor = %monitor,
                at = %chrono::Local::now().format("%H:%M:%S"),
                "alive - {watching}"
            );
        }
    })
}

/// Wait out the refresh interval, then reload the feed view.
pub async fn reload_after(feed: Arc<dyn FeedSource>, refresh: Duration) {
    tokio::time::sleep(refresh).await;
    tracing::info!(target: "scheduler", feed = feed.name(), "refreshing feed");
    counter!("monitor_reloads_total").increment(1);
    if let Err(e) = feed.reload().await {
        tracing::warn!(target: "scheduler", "feed reload failed: {e:#}");
    }
}
