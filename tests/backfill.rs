// tests/backfill.rs
//
// Paginating the feed back towards the last processed item, under paused time.
// Items are ids "0".."n-1", newest first.

use std::time::Duration;

use feed_monitor::backfill::{backfill_until, BackfillCfg, BackfillOutcome};
use feed_monitor::feed::scripted::ScriptedFeed;
use feed_monitor::FeedItem;

fn feed(n: usize, page: usize) -> ScriptedFeed {
    let items = (0..n)
        .map(|i| FeedItem::new(i.to_string(), format!("item number {i}")))
        .collect();
    ScriptedFeed::new(items, page)
}

#[tokio::test(start_paused = true)]
async fn stops_once_target_is_visible() {
    let f = feed(20, 5);
    let out = backfill_until(&f, Some("17"), &BackfillCfg::default()).await;
    assert_eq!(out, BackfillOutcome::Found { steps: 3 });
    assert_eq!(f.pagination_count(), 3);
    assert_eq!(f.visible_len(), 20);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_step_limit() {
    let f = feed(1000, 5);
    let cfg = BackfillCfg::default();
    let out = backfill_until(&f, Some("missing"), &cfg).await;
    assert_eq!(out, BackfillOutcome::StepLimit { steps: 50 });
    assert_eq!(f.pagination_count(), cfg.max_steps);
}

#[tokio::test(start_paused = true)]
async fn stops_when_feed_is_exhausted() {
    let f = feed(12, 5);
    let out = backfill_until(&f, Some("missing"), &BackfillCfg::default()).await;
    // Fully loaded after two pages; the size check only counts past step four.
    assert_eq!(out, BackfillOutcome::Exhausted { steps: 5 });
    assert_eq!(out.label(), "exhausted");
}

#[tokio::test(start_paused = true)]
async fn short_step_limit_is_honoured() {
    let f = feed(1000, 5);
    let cfg = BackfillCfg {
        max_steps: 3,
        step_wait: Duration::from_millis(10),
        ..BackfillCfg::default()
    };
    let started = tokio::time::Instant::now();
    let out = backfill_until(&f, Some("missing"), &cfg).await;
    assert_eq!(out, BackfillOutcome::StepLimit { steps: 3 });
    // One wait before every check, including the last.
    assert!(started.elapsed() >= Duration::from_millis(40));
}

#[tokio::test(start_paused = true)]
async fn no_target_loads_a_seed_batch() {
    let f = feed(100, 5);
    let out = backfill_until(&f, None, &BackfillCfg::default()).await;
    assert_eq!(out, BackfillOutcome::Seeded { steps: 6 });
    assert_eq!(f.visible_len(), 35);
}
