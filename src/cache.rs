//! # Fingerprint Cache
//! Bounded, insertion-ordered set of fingerprints of already delivered items.
//!
//! Eviction is FIFO: once the cache is full the oldest fingerprint goes,
//! and seeing a cached fingerprint again does not move it.

use std::collections::{HashSet, VecDeque};

/// Default number of fingerprints kept per monitor.
pub const DEFAULT_CACHE_CAPACITY: usize = 200;

#[derive(Debug, Clone)]
pub struct FingerprintCache {
    order: VecDeque<String>,
    members: HashSet<String>,
    cap: usize,
}

impl Default for FingerprintCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl FingerprintCache {
    /// `cap` of zero is treated as one.
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            order: VecDeque::with_capacity(cap.min(10_000)),
            members: HashSet::with_capacity(cap.min(10_000)),
            cap,
        }
    }

    /// Rebuild from a persisted list (oldest first). Duplicates are skipped
    /// and only the newest `cap` entries survive.
    pub fn from_entries<I>(entries: I, cap: usize) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut cache = Self::with_capacity(cap);
        for fp in entries {
            cache.insert(fp);
        }
        cache
    }

    pub fn contains(&self, fp: &str) -> bool {
        self.members.contains(fp)
    }

    /// Returns `true` when the fingerprint was not cached before.
    pub fn insert(&mut self, fp: impl Into<String>) -> bool {
        let fp = fp.into();
        if self.members.contains(&fp) {
            return false;
        }
        self.members.insert(fp.clone());
        self.order.push_back(fp);
        while self.order.len() > self.cap {
            if let Some(old) = self.order.pop_front() {
                self.members.remove(&old);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Oldest first, the persisted order.
    pub fn entries(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_noop_when_present() {
        let mut c = FingerprintCache::default();
        assert!(c.insert("a"));
        assert!(!c.insert("a"));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn evicts_oldest_first_at_capacity() {
        let mut c = FingerprintCache::default();
        for i in 0..201 {
            c.insert(format!("fp-{i}"));
        }
        assert_eq!(c.len(), DEFAULT_CACHE_CAPACITY);
        assert!(!c.contains("fp-0"));
        for i in 1..201 {
            assert!(c.contains(&format!("fp-{i}")), "fp-{i} should remain");
        }
        assert_eq!(c.entries().first().map(String::as_str), Some("fp-1"));
    }

    #[test]
    fn reseeing_does_not_refresh_position() {
        let mut c = FingerprintCache::with_capacity(3);
        c.insert("a");
        c.insert("b");
        c.insert("c");
        c.insert("a"); // already present, stays oldest
        c.insert("d");
        assert!(!c.contains("a"));
        assert_eq!(c.entries(), vec!["b", "c", "d"]);
    }

    #[test]
    fn from_entries_keeps_newest_and_dedups() {
        let raw = vec!["a", "b", "a", "c", "d"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        let c = FingerprintCache::from_entries(raw, 2);
        assert_eq!(c.entries(), vec!["c", "d"]);
        assert!(c.len() <= c.capacity());
    }
}
