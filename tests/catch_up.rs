// tests/catch_up.rs
//
// Catch-up walks newest first and stops at the last processed item;
// the idle gap since the last run decides between scanning and catching up.

use std::sync::Arc;

use feed_monitor::delivery::RecordingSink;
use feed_monitor::feed::scripted::ScriptedFeed;
use feed_monitor::history::RecentDeliveries;
use feed_monitor::state::{MemoryStore, StatePatch};
use feed_monitor::{Controller, FeedItem, MatchMode, MatchRules, ScanMode, StateStore};

const MIN: i64 = 60_000;
const NOW: i64 = 1_760_000_000_000;

fn ts(minute: u32) -> String {
    format!("2025-10-09T12:{minute:02}:00.000Z")
}

async fn controller_with_state(
    sink: Arc<RecordingSink>,
    patch: Option<StatePatch>,
) -> (Controller, StateStore) {
    let kv = Arc::new(MemoryStore::new());
    let store = StateStore::new(kv.clone(), "catchup");
    if let Some(p) = patch {
        store.save(p).await.unwrap();
    }
    let rules = MatchRules::new(["injured", "out"], MatchMode::WholeWord).unwrap();
    let ctl = Controller::attach(
        rules,
        sink,
        StateStore::new(kv, "catchup"),
        Arc::new(RecentDeliveries::default()),
        200,
    )
    .await;
    (ctl, store)
}

#[tokio::test]
async fn catch_up_stops_at_last_processed_item() {
    let sink = Arc::new(RecordingSink::new());
    let (ctl, store) = controller_with_state(
        sink.clone(),
        Some(StatePatch::item(NOW - 10 * MIN, Some("5".into()), Some(ts(3)))),
    )
    .await;

    // Feed order is deliberately not time order.
    let feed = ScriptedFeed::new(
        vec![
            FeedItem::new("7", "Guard is out tonight").posted(ts(4)),
            FeedItem::new("3", "Forward injured last week").posted(ts(2)),
            FeedItem::new("9", "Center injured in warmups").posted(ts(5)),
            FeedItem::new("5", "Coach says he is out").posted(ts(3)),
        ],
        10,
    );

    assert_eq!(ctl.mode_at(NOW).await, ScanMode::CatchingUp);
    let report = ctl.run_at(&feed, NOW).await.expect("feed readable");

    assert_eq!(report.mode, ScanMode::CatchingUp);
    assert_eq!(report.seen, 4);
    assert_eq!(report.walked, 2);
    assert_eq!(report.delivered, 2);
    assert_eq!(sink.ids(), vec!["9".to_string(), "7".to_string()]);

    // State points at the last delivered item, run time is now.
    let st = store.load().await;
    assert_eq!(st.last_run_time, NOW);
    assert_eq!(st.last_item_id.as_deref(), Some("7"));
    assert_eq!(st.last_item_time, Some(ts(4)));
}

#[tokio::test]
async fn catch_up_stops_on_older_timestamp_when_id_is_gone() {
    let sink = Arc::new(RecordingSink::new());
    let (ctl, _store) = controller_with_state(
        sink.clone(),
        Some(StatePatch::item(NOW - 30 * MIN, Some("gone".into()), Some(ts(3)))),
    )
    .await;

    let feed = ScriptedFeed::new(
        vec![
            FeedItem::new("9", "Center injured").posted(ts(5)),
            FeedItem::new("4", "Wing injured").posted(ts(3)),
            FeedItem::new("2", "Backup injured").posted(ts(1)),
        ],
        10,
    );

    let report = ctl.catch_up_at(&feed, NOW).await.unwrap();
    assert_eq!(report.walked, 1);
    assert_eq!(sink.ids(), vec!["9".to_string()]);
}

#[tokio::test]
async fn first_run_catches_up_over_the_whole_window() {
    let sink = Arc::new(RecordingSink::new());
    let (ctl, _store) = controller_with_state(sink.clone(), None).await;

    let feed = ScriptedFeed::new(
        vec![
            FeedItem::new("2", "Star is out").posted(ts(2)),
            FeedItem::new("1", "Nothing to see").posted(ts(1)),
        ],
        10,
    );

    let report = ctl.run_at(&feed, NOW).await.unwrap();
    assert_eq!(report.mode, ScanMode::CatchingUp);
    assert_eq!(report.walked, 2);
    assert_eq!(sink.ids(), vec!["2".to_string()]);
}

#[tokio::test]
async fn idle_gap_selects_mode() {
    let sink = Arc::new(RecordingSink::new());

    let (ctl, _) = controller_with_state(sink.clone(), Some(StatePatch::run(NOW - 6 * MIN))).await;
    assert_eq!(ctl.mode_at(NOW).await, ScanMode::CatchingUp);

    let (ctl, _) = controller_with_state(sink.clone(), Some(StatePatch::run(NOW - 2 * MIN))).await;
    assert_eq!(ctl.mode_at(NOW).await, ScanMode::Scanning);

    // A scan resets the gap.
    let (ctl, _) = controller_with_state(sink, Some(StatePatch::run(NOW - 6 * MIN))).await;
    let feed = ScriptedFeed::new(vec![], 5);
    ctl.scan_at(&feed, NOW).await.unwrap();
    assert_eq!(ctl.mode_at(NOW + MIN).await, ScanMode::Scanning);
}

#[tokio::test]
async fn custom_threshold_is_respected() {
    let sink = Arc::new(RecordingSink::new());
    let (ctl, _) = controller_with_state(sink, Some(StatePatch::run(NOW - 6 * MIN))).await;
    let ctl = ctl.with_threshold_minutes(10);
    assert_eq!(ctl.mode_at(NOW).await, ScanMode::Scanning);
    assert_eq!(ctl.mode_at(NOW + 4 * MIN).await, ScanMode::CatchingUp);
}

fn mixed_format_feed(n: i64) -> ScriptedFeed {
    use chrono::{Duration, FixedOffset, TimeZone, Utc};
    let base = Utc.with_ymd_and_hms(2025, 10, 9, 8, 0, 0).unwrap();
    let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
    // Interleave so feed order is unrelated to time order.
    let items = (0..n)
        .map(|k| (k * 37) % n)
        .map(|i| {
            let t = base + Duration::minutes(i);
            let posted = match i % 3 {
                0 => t.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                1 => t.with_timezone(&plus_two).format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
                _ => t.format("%Y-%m-%dT%H:%M:%S").to_string(),
            };
            FeedItem::new(i.to_string(), format!("Player {i} injured")).posted(posted)
        })
        .collect();
    ScriptedFeed::new(items, n as usize)
}

#[tokio::test]
async fn catch_up_orders_mixed_timestamp_formats() {
    let sink = Arc::new(RecordingSink::new());
    let (ctl, _) = controller_with_state(sink.clone(), None).await;

    let report = ctl.catch_up_at(&mixed_format_feed(200), NOW).await.unwrap();
    assert_eq!(report.delivered, 200);
    let expected: Vec<String> = (0..200).rev().map(|i: i64| i.to_string()).collect();
    assert_eq!(sink.ids(), expected);
}

#[tokio::test]
async fn catch_up_stops_at_offsetless_stored_time() {
    let sink = Arc::new(RecordingSink::new());
    // Item 150 is 10:30 UTC; the stored copy has no offset.
    let (ctl, _) = controller_with_state(
        sink.clone(),
        Some(StatePatch::item(NOW - 30 * MIN, Some("gone".into()), Some("2025-10-09T10:30:00".into()))),
    )
    .await;

    let report = ctl.catch_up_at(&mixed_format_feed(200), NOW).await.unwrap();
    assert_eq!(report.walked, 49);
    assert_eq!(sink.ids().last().map(String::as_str), Some("151"));
}
