// src/feed/scripted.rs
//! In-memory feed with a sliding materialized window.
//!
//! Items are held newest first; only the first `revealed` of them are
//! visible. `paginate` reveals one more page of older items, `push_new`
//! simulates a live arrival at the top, `reload` shrinks the window back to
//! a single page. Used by tests and local demos.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

use super::types::{FeedItem, FeedMutation, FeedSource};

#[derive(Debug)]
struct Inner {
    items: Vec<FeedItem>,
    revealed: usize,
    subscribers: Vec<mpsc::Sender<FeedMutation>>,
}

#[derive(Debug)]
pub struct ScriptedFeed {
    inner: Mutex<Inner>,
    page_size: usize,
    paginations: AtomicUsize,
    reloads: AtomicUsize,
}

impl ScriptedFeed {
    /// `items` newest first; the first `page_size` are visible initially.
    pub fn new(items: Vec<FeedItem>, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        Self {
            inner: Mutex::new(Inner {
                items,
                revealed: page_size,
                subscribers: Vec::new(),
            }),
            page_size,
            paginations: AtomicUsize::new(0),
            reloads: AtomicUsize::new(0),
        }
    }

    /// A new item appears at the top of the feed.
    pub fn push_new(&self, item: FeedItem) {
        let mut inner = self.inner.lock().expect("scripted feed mutex poisoned");
        inner.items.insert(0, item);
        inner.revealed += 1;
        Self::notify(&mut inner);
    }

    pub fn pagination_count(&self) -> usize {
        self.paginations.load(Ordering::SeqCst)
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn visible_len(&self) -> usize {
        let inner = self.inner.lock().expect("scripted feed mutex poisoned");
        inner.revealed.min(inner.items.len())
    }

    fn notify(inner: &mut Inner) {
        let loaded = inner.revealed.min(inner.items.len());
        inner.subscribers.retain(|tx| {
            !matches!(
                tx.try_send(FeedMutation { loaded }),
                Err(mpsc::error::TrySendError::Closed(_))
            )
        });
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    async fn snapshot(&self) -> Result<Vec<FeedItem>> {
        let inner = self.inner.lock().expect("scripted feed mutex poisoned");
        let n = inner.revealed.min(inner.items.len());
        Ok(inner.items[..n].to_vec())
    }

    fn subscribe(&self) -> mpsc::Receiver<FeedMutation> {
        let (tx, rx) = mpsc::channel(64);
        let mut inner = self.inner.lock().expect("scripted feed mutex poisoned");
        inner.subscribers.push(tx);
        rx
    }

    async fn paginate(&self) -> Result<()> {
        self.paginations.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().expect("scripted feed mutex poisoned");
        let before = inner.revealed.min(inner.items.len());
        inner.revealed = inner.revealed.saturating_add(self.page_size);
        if inner.revealed.min(inner.items.len()) != before {
            Self::notify(&mut inner);
        }
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().expect("scripted feed mutex poisoned");
        inner.revealed = self.page_size;
        // Reload drops every live subscription.
        inner.subscribers.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
