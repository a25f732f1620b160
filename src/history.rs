//! history.rs — in-memory log of recently delivered items for the status surface.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::delivery::DeliveryPayload;

#[derive(Debug, Clone, serde::Serialize)]
pub struct DeliveredEntry {
    pub delivered_at_ms: i64,
    pub mode: &'static str, // "scanning" | "catching-up"
    #[serde(flatten)]
    pub payload: DeliveryPayload,
}

#[derive(Debug)]
pub struct RecentDeliveries {
    inner: Mutex<VecDeque<DeliveredEntry>>,
    cap: usize,
}

impl Default for RecentDeliveries {
    fn default() -> Self {
        Self::with_capacity(500)
    }
}

impl RecentDeliveries {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 10_000);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    pub fn push(&self, entry: DeliveredEntry) {
        let mut v = self.inner.lock().expect("history mutex poisoned");
        v.push_back(entry);
        while v.len() > self.cap {
            v.pop_front();
        }
    }

    /// Newest last.
    pub fn snapshot_last_n(&self, n: usize) -> Vec<DeliveredEntry> {
        let v = self.inner.lock().expect("history mutex poisoned");
        let start = v.len().saturating_sub(n);
        v.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("history mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
