//! # Monitor State Store
//! Per-feed persisted record (last run time, last processed item) plus the
//! fingerprint cache, kept in a small key-value store.
//!
//! Reads never fail: anything absent or unreadable comes back as the zero
//! value. Writes are best-effort and only logged on failure.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;

use crate::cache::FingerprintCache;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorState {
    /// Unix millis of the last completed scan; 0 when never run.
    #[serde(default)]
    pub last_run_time: i64,
    #[serde(default, alias = "lastTweetId")]
    pub last_item_id: Option<String>,
    #[serde(default, alias = "lastTweetTime")]
    pub last_item_time: Option<String>,
}

/// Partial update: `None` leaves a field unchanged, `Some(None)` clears an
/// item field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatePatch {
    pub last_run_time: Option<i64>,
    pub last_item_id: Option<Option<String>>,
    pub last_item_time: Option<Option<String>>,
}

impl StatePatch {
    /// End of a scan.
    pub fn run(now_ms: i64) -> Self {
        Self {
            last_run_time: Some(now_ms),
            ..Self::default()
        }
    }

    /// An item was just delivered.
    pub fn item(now_ms: i64, id: Option<String>, posted_at: Option<String>) -> Self {
        Self {
            last_run_time: Some(now_ms),
            last_item_id: Some(id),
            last_item_time: Some(posted_at),
        }
    }

    pub fn apply(self, state: &mut MonitorState) {
        if let Some(t) = self.last_run_time {
            state.last_run_time = t;
        }
        if let Some(id) = self.last_item_id {
            state.last_item_id = id;
        }
        if let Some(ts) = self.last_item_time {
            state.last_item_time = ts;
        }
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating state dir {}", self.dir.display()))?;
        let path = self.path_for(key);
        fs::write(&path, value)
            .await
            .with_context(|| format!("writing {}", path.display()))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let map = self.map.lock().expect("memory store mutex poisoned");
        Ok(map.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.map.lock().expect("memory store mutex poisoned");
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut map = self.map.lock().expect("memory store mutex poisoned");
        map.remove(key);
        Ok(())
    }
}

/// Cache and state blobs of one monitor, namespaced by its feed key.
#[derive(Clone)]
pub struct StateStore {
    kv: Arc<dyn KvStore>,
    state_key: String,
    cache_key: String,
}

impl StateStore {
    pub fn new(kv: Arc<dyn KvStore>, feed_key: &str) -> Self {
        Self {
            kv,
            state_key: format!("state_{feed_key}"),
            cache_key: format!("seen_cache_{feed_key}"),
        }
    }

    pub fn state_key(&self) -> &str {
        &self.state_key
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Stored record; absent or malformed data is the zero value, a failed
    /// read is an error.
    async fn read(&self) -> Result<MonitorState> {
        match self.kv.get(&self.state_key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(key = %self.state_key, error = %e, "malformed monitor state, starting fresh");
                MonitorState::default()
            })),
            None => Ok(MonitorState::default()),
        }
    }

    pub async fn load(&self) -> MonitorState {
        self.read().await.unwrap_or_else(|e| {
            tracing::warn!(key = %self.state_key, "read state: {e:#}");
            MonitorState::default()
        })
    }

    /// Merge `patch` into the persisted record and return the result.
    /// Nothing is written when the stored record cannot be read.
    pub async fn save(&self, patch: StatePatch) -> Result<MonitorState> {
        let mut state = self
            .read()
            .await
            .context("state unreadable, leaving stored record alone")?;
        patch.apply(&mut state);
        self.persist(&state).await;
        Ok(state)
    }

    /// Write `state` as the whole record. Failures are logged only.
    pub async fn persist(&self, state: &MonitorState) {
        match serde_json::to_string(state) {
            Ok(raw) => {
                if let Err(e) = self.kv.put(&self.state_key, &raw).await {
                    tracing::warn!(key = %self.state_key, "write state: {e:#}");
                }
            }
            Err(e) => tracing::warn!(key = %self.state_key, error = %e, "encode state"),
        }
    }

    pub async fn load_cache(&self, cap: usize) -> FingerprintCache {
        let entries: Vec<String> = match self.kv.get(&self.cache_key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(key = %self.cache_key, error = %e, "malformed seen cache, starting empty");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(key = %self.cache_key, "read seen cache: {e:#}");
                Vec::new()
            }
        };
        FingerprintCache::from_entries(entries, cap)
    }

    pub async fn save_cache(&self, cache: &FingerprintCache) {
        match serde_json::to_string(&cache.entries()) {
            Ok(raw) => {
                if let Err(e) = self.kv.put(&self.cache_key, &raw).await {
                    tracing::warn!(key = %self.cache_key, "write seen cache: {e:#}");
                }
            }
            Err(e) => tracing::warn!(key = %self.cache_key, error = %e, "encode seen cache"),
        }
    }

    /// Out-of-band reset: forget both the state and the seen cache.
    pub async fn reset(&self) -> Result<()> {
        self.kv.remove(&self.state_key).await?;
        self.kv.remove(&self.cache_key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_store() -> (Arc<MemoryStore>, StateStore) {
        let kv = Arc::new(MemoryStore::new());
        let store = StateStore::new(kv.clone(), "52021139");
        (kv, store)
    }

    #[tokio::test]
    async fn load_defaults_to_zero_value() {
        let (_, store) = mem_store();
        assert_eq!(store.load().await, MonitorState::default());
    }

    #[tokio::test]
    async fn malformed_state_is_treated_as_absent() {
        let (kv, store) = mem_store();
        kv.put(store.state_key(), "{not json").await.unwrap();
        assert_eq!(store.load().await, MonitorState::default());
    }

    #[tokio::test]
    async fn save_merges_instead_of_replacing() {
        let (_, store) = mem_store();
        store
            .save(StatePatch::item(
                1_000,
                Some("77".into()),
                Some("2025-06-01T10:00:00.000Z".into()),
            ))
            .await
            .unwrap();
        let s = store.save(StatePatch::run(5_000)).await.unwrap();
        assert_eq!(s.last_run_time, 5_000);
        assert_eq!(s.last_item_id.as_deref(), Some("77"));
        assert_eq!(s.last_item_time.as_deref(), Some("2025-06-01T10:00:00.000Z"));
        assert_eq!(store.load().await, s);
    }

    /// Reads fail while `broken` is set; writes always go through.
    #[derive(Default)]
    struct FlakyReads {
        inner: MemoryStore,
        broken: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl KvStore for FlakyReads {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            if self.broken.load(std::sync::atomic::Ordering::SeqCst) {
                anyhow::bail!("EIO reading {key}");
            }
            self.inner.get(key).await
        }
        async fn put(&self, key: &str, value: &str) -> Result<()> {
            self.inner.put(key, value).await
        }
        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }
    }

    #[tokio::test]
    async fn failed_read_does_not_clobber_stored_record() {
        let kv = Arc::new(FlakyReads::default());
        let store = StateStore::new(kv.clone(), "flaky");
        store
            .save(StatePatch::item(1, Some("7".into()), Some("2025-10-09T12:00:00Z".into())))
            .await
            .unwrap();

        kv.broken.store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(store.save(StatePatch::run(2)).await.is_err());
        assert_eq!(store.load().await, MonitorState::default());

        kv.broken.store(false, std::sync::atomic::Ordering::SeqCst);
        let s = store.load().await;
        assert_eq!(s.last_run_time, 1);
        assert_eq!(s.last_item_id.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn item_patch_can_clear_fields() {
        let (_, store) = mem_store();
        store
            .save(StatePatch::item(1, Some("1".into()), Some("t".into())))
            .await
            .unwrap();
        let s = store.save(StatePatch::item(2, None, None)).await.unwrap();
        assert!(s.last_item_id.is_none());
        assert!(s.last_item_time.is_none());
    }

    #[tokio::test]
    async fn state_json_uses_camel_case_and_accepts_legacy_names() {
        let (kv, store) = mem_store();
        kv.put(
            store.state_key(),
            r#"{"lastRunTime":12,"lastTweetId":"9","lastTweetTime":"2025-01-01T00:00:00Z"}"#,
        )
        .await
        .unwrap();
        let s = store.load().await;
        assert_eq!(s.last_item_id.as_deref(), Some("9"));

        store.save(StatePatch::run(13)).await.unwrap();
        let raw = kv.get(store.state_key()).await.unwrap().unwrap();
        assert!(raw.contains("\"lastRunTime\":13"));
        assert!(raw.contains("\"lastItemId\":\"9\""));
    }

    #[tokio::test]
    async fn cache_roundtrips_and_resets() {
        let (_, store) = mem_store();
        let mut cache = store.load_cache(200).await;
        assert!(cache.is_empty());
        cache.insert("one");
        cache.insert("two");
        store.save_cache(&cache).await;

        let back = store.load_cache(200).await;
        assert_eq!(back.entries(), vec!["one", "two"]);

        store.reset().await.unwrap();
        assert!(store.load_cache(200).await.is_empty());
    }

    #[tokio::test]
    async fn file_store_persists_under_sanitized_key() {
        let dir = tempfile::tempdir().unwrap();
        let kv = Arc::new(FileStore::new(dir.path().join("state")));
        let store = StateStore::new(kv.clone(), "list/42");
        assert_eq!(store.load().await, MonitorState::default());

        store.save(StatePatch::run(42)).await.unwrap();
        assert!(dir.path().join("state").join("state_list_42.json").exists());
        assert_eq!(store.load().await.last_run_time, 42);

        store.reset().await.unwrap();
        assert_eq!(kv.get(store.state_key()).await.unwrap(), None);
    }
}
