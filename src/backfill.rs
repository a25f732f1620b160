//! # Backfill Driver
//! Drives the feed's pagination until the last processed item is loaded
//! again, a step bound is hit, or the feed stops growing.
//!
//! Every outcome counts as completion: this is best-effort recovery of
//! content that scrolled out of the materialized window while the monitor
//! was away, not a guaranteed resync.

use metrics::{counter, histogram};
use std::time::Duration;
use tokio::time;

use crate::feed::FeedSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillCfg {
    /// Render latency allowed after each pagination request.
    pub step_wait: Duration,
    pub max_steps: usize,
    /// Steps taken to seed content when nothing was processed before.
    pub seed_steps: usize,
    /// An unchanged size only means "bottom" after more steps than this.
    pub min_steps_before_exhausted: usize,
}

impl Default for BackfillCfg {
    fn default() -> Self {
        Self {
            step_wait: Duration::from_millis(1800),
            max_steps: 50,
            seed_steps: 6,
            min_steps_before_exhausted: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillOutcome {
    /// No target: fixed number of steps to load an initial batch.
    Seeded { steps: usize },
    Found { steps: usize },
    StepLimit { steps: usize },
    /// Loaded size stopped changing; the target is out of reach.
    Exhausted { steps: usize },
}

impl BackfillOutcome {
    pub fn steps(&self) -> usize {
        match *self {
            BackfillOutcome::Seeded { steps }
            | BackfillOutcome::Found { steps }
            | BackfillOutcome::StepLimit { steps }
            | BackfillOutcome::Exhausted { steps } => steps,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BackfillOutcome::Seeded { .. } => "seeded",
            BackfillOutcome::Found { .. } => "found",
            BackfillOutcome::StepLimit { .. } => "step_limit",
            BackfillOutcome::Exhausted { .. } => "exhausted",
        }
    }
}

pub async fn backfill_until(
    feed: &dyn FeedSource,
    target_id: Option<&str>,
    cfg: &BackfillCfg,
) -> BackfillOutcome {
    let outcome = match target_id {
        None => seed(feed, cfg).await,
        Some(target) => until_seen(feed, target, cfg).await,
    };

    counter!("monitor_backfill_total", "outcome" => outcome.label()).increment(1);
    histogram!("monitor_backfill_steps").record(outcome.steps() as f64);
    tracing::info!(
        target: "backfill",
        outcome = outcome.label(),
        steps = outcome.steps(),
        feed = feed.name(),
        "backfill finished"
    );
    outcome
}

async fn seed(feed: &dyn FeedSource, cfg: &BackfillCfg) -> BackfillOutcome {
    tracing::debug!(target: "backfill", "no last item; loading initial batch");
    for _ in 0..cfg.seed_steps {
        time::sleep(cfg.step_wait).await;
        if let Err(e) = feed.paginate().await {
            tracing::warn!(target: "backfill", "paginate failed: {e:#}");
        }
    }
    // Let the last page render before anyone inspects it.
    time::sleep(cfg.step_wait).await;
    BackfillOutcome::Seeded {
        steps: cfg.seed_steps,
    }
}

async fn until_seen(feed: &dyn FeedSource, target: &str, cfg: &BackfillCfg) -> BackfillOutcome {
    let mut steps = 0usize;
    let mut last_size = 0usize;

    loop {
        time::sleep(cfg.step_wait).await;

        // One read per step serves both the presence and the size check.
        let (present, size) = match feed.snapshot().await {
            Ok(items) => (
                items.iter().any(|it| it.id.as_deref() == Some(target)),
                items.len(),
            ),
            Err(e) => {
                tracing::warn!(target: "backfill", "snapshot failed: {e:#}");
                (false, last_size)
            }
        };
        if present {
            return BackfillOutcome::Found { steps };
        }
        if steps >= cfg.max_steps {
            return BackfillOutcome::StepLimit { steps };
        }

        if size == last_size && steps > cfg.min_steps_before_exhausted {
            return BackfillOutcome::Exhausted { steps };
        }
        last_size = size;

        if let Err(e) = feed.paginate().await {
            tracing::warn!(target: "backfill", "paginate failed: {e:#}");
        }
        steps += 1;
        tracing::trace!(target: "backfill", steps, size, "paginated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{scripted::ScriptedFeed, FeedItem};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn feed(n: usize, page: usize) -> ScriptedFeed {
        let items = (0..n)
            .map(|i| FeedItem::new(format!("{}", 10_000 - i), format!("text {i}")))
            .collect();
        ScriptedFeed::new(items, page)
    }

    #[tokio::test(start_paused = true)]
    async fn seeds_fixed_number_of_steps_without_target() {
        let f = feed(100, 5);
        let out = backfill_until(&f, None, &BackfillCfg::default()).await;
        assert_eq!(out, BackfillOutcome::Seeded { steps: 6 });
        assert_eq!(f.pagination_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn target_already_visible_needs_no_steps() {
        let f = feed(20, 5);
        let out = backfill_until(&f, Some("9998"), &BackfillCfg::default()).await;
        assert_eq!(out, BackfillOutcome::Found { steps: 0 });
        assert_eq!(f.pagination_count(), 0);
    }

    /// Counts reads against the wrapped feed.
    struct CountingFeed {
        inner: ScriptedFeed,
        snapshots: AtomicUsize,
        sizes: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl FeedSource for CountingFeed {
        async fn snapshot(&self) -> anyhow::Result<Vec<FeedItem>> {
            self.snapshots.fetch_add(1, Ordering::SeqCst);
            self.inner.snapshot().await
        }
        fn subscribe(&self) -> tokio::sync::mpsc::Receiver<crate::feed::FeedMutation> {
            self.inner.subscribe()
        }
        async fn paginate(&self) -> anyhow::Result<()> {
            self.inner.paginate().await
        }
        async fn reload(&self) -> anyhow::Result<()> {
            self.inner.reload().await
        }
        async fn loaded_size(&self) -> anyhow::Result<usize> {
            self.sizes.fetch_add(1, Ordering::SeqCst);
            self.inner.loaded_size().await
        }
        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_feed_read_per_step() {
        let f = CountingFeed {
            inner: feed(12, 5),
            snapshots: AtomicUsize::new(0),
            sizes: AtomicUsize::new(0),
        };
        let out = backfill_until(&f, Some("missing"), &BackfillCfg::default()).await;
        assert_eq!(out, BackfillOutcome::Exhausted { steps: 5 });
        assert_eq!(f.snapshots.load(Ordering::SeqCst), 6);
        assert_eq!(f.sizes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_steps() {
        let f = feed(20, 5);
        let cfg = BackfillCfg::default();
        let started = time::Instant::now();
        // Index 12 becomes visible after two pages.
        let out = backfill_until(&f, Some("9988"), &cfg).await;
        assert_eq!(out, BackfillOutcome::Found { steps: 2 });
        assert!(started.elapsed() >= cfg.step_wait * 3);
    }
}
