//! # Catch-Up Controller
//! Decides between a cheap incremental scan and a catch-up walk, and runs the
//! candidate pipeline (dedup → match → deliver → record) over feed items.
//!
//! Mode selection looks only at how long ago the last scan finished:
//! after an idle gap of `catch_up_threshold` or more, the visible items are
//! replayed newest to oldest until the last processed item is reached.
//! The fingerprint cache makes both paths idempotent; the split only saves
//! work and bounds how far back a catch-up walks.

use chrono::{DateTime, NaiveDateTime, Utc};
use metrics::{counter, gauge};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cache::FingerprintCache;
use crate::delivery::{Deliver, DeliveryPayload};
use crate::feed::{FeedItem, FeedSource};
use crate::history::{DeliveredEntry, RecentDeliveries};
use crate::matcher::MatchRules;
use crate::state::{MonitorState, StatePatch, StateStore};

pub const CATCH_UP_THRESHOLD_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Scanning,
    CatchingUp,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Scanning => "scanning",
            ScanMode::CatchingUp => "catching-up",
        }
    }
}

/// Gap since the last scan, in whole-and-fractional minutes, against the threshold.
pub fn select_mode(now_ms: i64, state: &MonitorState, threshold_minutes: i64) -> ScanMode {
    let gap_minutes = now_ms.saturating_sub(state.last_run_time) as f64 / 60_000.0;
    if gap_minutes >= threshold_minutes as f64 {
        ScanMode::CatchingUp
    } else {
        ScanMode::Scanning
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub mode: ScanMode,
    /// Items with text in the snapshot.
    pub seen: usize,
    /// Items that went through the pipeline (catch-up stops early).
    pub walked: usize,
    pub delivered: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    Duplicate,
    Unmatched,
    Delivered,
}

/// Sort key for an item timestamp. Offset-less ISO-8601 is read as UTC;
/// unparsable text sorts before every parsed instant, and the raw string
/// breaks ties so the order stays total.
fn posted_key(ts: &str) -> (Option<DateTime<Utc>>, &str) {
    let t = ts.trim();
    let parsed = DateTime::parse_from_rfc3339(t)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            [
                "%Y-%m-%dT%H:%M:%S%.f",
                "%Y-%m-%dT%H:%M:%S",
                "%Y-%m-%d %H:%M:%S%.f",
                "%Y-%m-%d %H:%M:%S",
            ]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(t, fmt).ok())
                .map(|n| n.and_utc())
        });
    (parsed, ts)
}

/// Orders ISO-8601 timestamps; missing ones sort as oldest.
pub fn posted_cmp(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => posted_key(a).cmp(&posted_key(b)),
    }
}

/// Short, log-safe id for an item's fingerprint.
pub(crate) fn fp_hash(fp: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(fp.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

struct Inner {
    cache: FingerprintCache,
    state: MonitorState,
}

pub struct Controller {
    rules: MatchRules,
    sink: Arc<dyn Deliver>,
    store: StateStore,
    history: Arc<RecentDeliveries>,
    threshold_minutes: i64,
    inner: Mutex<Inner>,
}

impl Controller {
    /// Load persisted cache and state for this feed.
    pub async fn attach(
        rules: MatchRules,
        sink: Arc<dyn Deliver>,
        store: StateStore,
        history: Arc<RecentDeliveries>,
        cache_capacity: usize,
    ) -> Self {
        let cache = store.load_cache(cache_capacity).await;
        let state = store.load().await;
        tracing::info!(
            target: "monitor",
            cached = cache.len(),
            last_run_time = state.last_run_time,
            last_item_id = ?state.last_item_id,
            mode = rules.mode().as_str(),
            sink = sink.name(),
            "controller attached"
        );
        Self {
            rules,
            sink,
            store,
            history,
            threshold_minutes: CATCH_UP_THRESHOLD_MINUTES,
            inner: Mutex::new(Inner { cache, state }),
        }
    }

    pub fn with_threshold_minutes(mut self, minutes: i64) -> Self {
        self.threshold_minutes = minutes.max(1);
        self
    }

    pub fn rules(&self) -> &MatchRules {
        &self.rules
    }

    pub async fn state(&self) -> MonitorState {
        self.inner.lock().await.state.clone()
    }

    pub async fn cache_len(&self) -> usize {
        self.inner.lock().await.cache.len()
    }

    pub async fn mode_at(&self, now_ms: i64) -> ScanMode {
        let inner = self.inner.lock().await;
        select_mode(now_ms, &inner.state, self.threshold_minutes)
    }

    /// One trigger: pick the mode from the idle gap and run it.
    pub async fn run(&self, feed: &dyn FeedSource) -> Option<ScanReport> {
        self.run_at(feed, now_ms()).await
    }

    pub async fn run_at(&self, feed: &dyn FeedSource, now_ms: i64) -> Option<ScanReport> {
        match self.mode_at(now_ms).await {
            ScanMode::Scanning => self.scan_at(feed, now_ms).await,
            ScanMode::CatchingUp => self.catch_up_at(feed, now_ms).await,
        }
    }

    pub async fn catch_up(&self, feed: &dyn FeedSource) -> Option<ScanReport> {
        self.catch_up_at(feed, now_ms()).await
    }

    /// Cheap path: every visible item once, in feed order.
    /// `None` when the feed could not be read; the run time is then left alone.
    pub async fn scan_at(&self, feed: &dyn FeedSource, now_ms: i64) -> Option<ScanReport> {
        let items = enumerate(feed).await?;
        let mut inner = self.inner.lock().await;

        let mut delivered = 0;
        for item in &items {
            if self
                .process_candidate(&mut inner, item, now_ms, ScanMode::Scanning)
                .await
                == Candidate::Delivered
            {
                delivered += 1;
            }
        }
        self.record(&mut inner, StatePatch::run(now_ms)).await;
        drop(inner);

        Some(self.finish(ScanMode::Scanning, items.len(), items.len(), delivered, now_ms))
    }

    /// Recovery path: newest first, stopping at the last processed item.
    pub async fn catch_up_at(&self, feed: &dyn FeedSource, now_ms: i64) -> Option<ScanReport> {
        let mut items = enumerate(feed).await?;
        items.sort_by(|a, b| posted_cmp(b.posted_at.as_deref(), a.posted_at.as_deref()));

        let mut inner = self.inner.lock().await;
        let stop_at = inner.state.clone();

        let mut walked = 0;
        let mut delivered = 0;
        for item in &items {
            if reached_processed(item, &stop_at) {
                break;
            }
            walked += 1;
            if self
                .process_candidate(&mut inner, item, now_ms, ScanMode::CatchingUp)
                .await
                == Candidate::Delivered
            {
                delivered += 1;
            }
        }
        self.record(&mut inner, StatePatch::run(now_ms)).await;
        drop(inner);

        Some(self.finish(ScanMode::CatchingUp, items.len(), walked, delivered, now_ms))
    }

    /// Runs one item through dedup, matching and delivery.
    pub async fn process(&self, item: &FeedItem, now_ms: i64) -> Candidate {
        let mut inner = self.inner.lock().await;
        self.process_candidate(&mut inner, item, now_ms, ScanMode::Scanning)
            .await
    }

    async fn process_candidate(
        &self,
        inner: &mut Inner,
        item: &FeedItem,
        now_ms: i64,
        mode: ScanMode,
    ) -> Candidate {
        let fp = item.fingerprint();
        if inner.cache.contains(&fp) {
            counter!("monitor_dedup_total").increment(1);
            return Candidate::Duplicate;
        }
        // Unmatched items stay uncached so a rules change can pick them up.
        if !self.rules.matches(&item.text) {
            counter!("monitor_unmatched_total").increment(1);
            return Candidate::Unmatched;
        }

        let payload = DeliveryPayload::from_item(item, now_ms);
        tracing::debug!(
            target: "monitor",
            fp = %fp_hash(&fp),
            id = %payload.tweet_id,
            author = %payload.author_handle,
            keyword = ?self.rules.matched_keyword(&item.text),
            "match"
        );
        self.sink.send(payload.clone());
        self.history.push(DeliveredEntry {
            delivered_at_ms: now_ms,
            mode: mode.as_str(),
            payload,
        });
        counter!("monitor_delivered_total").increment(1);

        // Advance even if the delivery later fails; no reprocessing storms.
        if inner.cache.insert(fp) {
            self.store.save_cache(&inner.cache).await;
            gauge!("monitor_cache_size").set(inner.cache.len() as f64);
        }
        self.record(
            inner,
            StatePatch::item(now_ms, item.id.clone(), item.posted_at.clone()),
        )
        .await;
        Candidate::Delivered
    }

    /// The in-memory state is authoritative after attach; every patch is
    /// merged there and the whole record written back.
    async fn record(&self, inner: &mut Inner, patch: StatePatch) {
        patch.apply(&mut inner.state);
        self.store.persist(&inner.state).await;
    }

    fn finish(
        &self,
        mode: ScanMode,
        seen: usize,
        walked: usize,
        delivered: usize,
        now_ms: i64,
    ) -> ScanReport {
        counter!("monitor_scans_total", "mode" => mode.as_str()).increment(1);
        gauge!("monitor_last_run_ts").set((now_ms / 1000) as f64);
        let report = ScanReport {
            mode,
            seen,
            walked,
            delivered,
        };
        if delivered > 0 || mode == ScanMode::CatchingUp {
            tracing::info!(target: "monitor", mode = mode.as_str(), seen, walked, delivered, "scan done");
        } else {
            tracing::debug!(target: "monitor", mode = mode.as_str(), seen, "scan done");
        }
        report
    }
}

/// Everything at or before the last processed point counts as handled.
fn reached_processed(item: &FeedItem, stop_at: &MonitorState) -> bool {
    if let (Some(last_id), Some(id)) = (stop_at.last_item_id.as_deref(), item.id.as_deref()) {
        if id == last_id {
            return true;
        }
    }
    if let (Some(last_t), Some(t)) = (stop_at.last_item_time.as_deref(), item.posted_at.as_deref())
    {
        let reached = match (posted_key(t), posted_key(last_t)) {
            ((Some(a), _), (Some(b), _)) => a <= b,
            (a, b) => a <= b,
        };
        if reached {
            return true;
        }
    }
    false
}

/// Visible items that carry text; `None` when the feed cannot be read.
async fn enumerate(feed: &dyn FeedSource) -> Option<Vec<FeedItem>> {
    match feed.snapshot().await {
        Ok(items) => Some(
            items
                .into_iter()
                .filter(|it| !it.text.trim().is_empty())
                .collect(),
        ),
        Err(e) => {
            tracing::warn!(target: "monitor", feed = feed.name(), "snapshot failed: {e:#}");
            None
        }
    }
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
