//! # Monitor session
//! Wires the feed, the controller and the observer together for one feed
//! view lifetime, and loops sessions across reloads.
//!
//! A session:
//! 1. subscribes to mutations and runs the controller once (catch-up or scan),
//! 2. starts the debounced observer,
//! 3. after the initial delay, backfills towards the last processed item and
//!    runs one more catch-up over the now larger window,
//! 4. waits out the refresh interval and reloads the feed.
//!
//! Reload ends the session: the observer and its subscription are dropped,
//! persisted cache and state carry over to the next session.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::backfill::{backfill_until, BackfillCfg, BackfillOutcome};
use crate::controller::{Controller, ScanReport};
use crate::feed::FeedSource;
use crate::observer::Debouncer;
use crate::scheduler::reload_after;

#[derive(Debug, Clone, Copy)]
pub struct SessionCfg {
    pub debounce: Duration,
    pub initial_delay: Duration,
    pub refresh: Duration,
    pub backfill: BackfillCfg,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(400),
            initial_delay: Duration::from_millis(2000),
            refresh: Duration::from_secs(60),
            backfill: BackfillCfg::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSummary {
    pub attach: Option<ScanReport>,
    pub backfill: BackfillOutcome,
    pub catch_up: Option<ScanReport>,
    /// Debounced controller runs while the session was live.
    pub observed_runs: usize,
}

pub struct Monitor {
    feed: Arc<dyn FeedSource>,
    controller: Arc<Controller>,
    cfg: SessionCfg,
}

impl Monitor {
    pub fn new(feed: Arc<dyn FeedSource>, controller: Arc<Controller>, cfg: SessionCfg) -> Self {
        Self {
            feed,
            controller,
            cfg,
        }
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    /// One feed view lifetime, ending with a reload.
    pub async fn run_session(&self) -> SessionSummary {
        let rx = self.feed.subscribe();
        let attach = self.controller.run(self.feed.as_ref()).await;

        let runs = Arc::new(AtomicUsize::new(0));
        let observer = {
            let feed = self.feed.clone();
            let controller = self.controller.clone();
            let runs = runs.clone();
            let debouncer = Debouncer::new(self.cfg.debounce);
            tokio::spawn(async move {
                debouncer
                    .run(rx, move || {
                        let feed = feed.clone();
                        let controller = controller.clone();
                        let runs = runs.clone();
                        async move {
                            controller.run(feed.as_ref()).await;
                            runs.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                    .await
            })
        };

        time::sleep(self.cfg.initial_delay).await;
        let target = self.controller.state().await.last_item_id;
        tracing::debug!(target: "monitor", last_item = ?target, "starting backfill");
        let backfill = backfill_until(self.feed.as_ref(), target.as_deref(), &self.cfg.backfill).await;
        let catch_up = self.controller.catch_up(self.feed.as_ref()).await;

        reload_after(self.feed.clone(), self.cfg.refresh).await;

        // Reload drops the subscription; stop the observer either way.
        observer.abort();
        let observed_runs = runs.load(Ordering::SeqCst);

        SessionSummary {
            attach,
            backfill,
            catch_up,
            observed_runs,
        }
    }

    /// Sessions back to back until the task is cancelled.
    pub async fn run_forever(&self) {
        let mut session = 0u64;
        loop {
            session += 1;
            let s = self.run_session().await;
            tracing::info!(
                target: "monitor",
                session,
                backfill = s.backfill.label(),
                catch_up_delivered = s.catch_up.map(|r| r.delivered).unwrap_or(0),
                observed_runs = s.observed_runs,
                "session ended, feed reloaded"
            );
        }
    }
}
