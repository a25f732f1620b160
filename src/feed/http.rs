// src/feed/http.rs
//! Feed adapter for a rendering bridge reachable over HTTP.
//!
//! The bridge owns the actual page (browser, headless renderer, ...) and
//! exposes three endpoints:
//! - `GET  <base>/items`    → JSON array of [`FeedItem`] in display order
//! - `POST <base>/paginate` → materialize older content
//! - `POST <base>/reload`   → reload the whole feed view
//!
//! Mutation notifications are derived by polling `/items` and comparing a
//! cheap signature of the snapshot.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::mpsc;

use super::types::{FeedItem, FeedMutation, FeedSource};

const MUTATION_CHANNEL_CAP: usize = 64;

#[derive(Clone)]
pub struct HttpFeedSource {
    base: String,
    client: Client,
    poll: Duration,
}

impl HttpFeedSource {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            client: Client::new(),
            poll: Duration::from_millis(1000),
        }
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll.max(Duration::from_millis(50));
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    async fn fetch_items(client: &Client, url: &str) -> Result<Vec<FeedItem>> {
        client
            .get(url)
            .send()
            .await
            .context("feed bridge GET /items")?
            .error_for_status()
            .context("feed bridge /items non-2xx")?
            .json::<Vec<FeedItem>>()
            .await
            .context("parse feed bridge items")
    }

    async fn post_action(&self, path: &str) -> Result<()> {
        self.client
            .post(self.url(path))
            .send()
            .await
            .with_context(|| format!("feed bridge POST /{path}"))?
            .error_for_status()
            .with_context(|| format!("feed bridge /{path} non-2xx"))?;
        Ok(())
    }
}

/// Changes whenever items are added, removed, or the edges of the window move.
fn signature(items: &[FeedItem]) -> (usize, Option<String>, Option<String>) {
    let edge = |it: Option<&FeedItem>| it.map(|i| i.id.clone().unwrap_or_else(|| i.fingerprint()));
    (items.len(), edge(items.first()), edge(items.last()))
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn snapshot(&self) -> Result<Vec<FeedItem>> {
        Self::fetch_items(&self.client, &self.url("items")).await
    }

    fn subscribe(&self) -> mpsc::Receiver<FeedMutation> {
        let (tx, rx) = mpsc::channel(MUTATION_CHANNEL_CAP);
        let client = self.client.clone();
        let url = self.url("items");
        let poll = self.poll;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll);
            let mut last = None;
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                let items = match Self::fetch_items(&client, &url).await {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::debug!(target: "observer", error = ?e, "bridge poll failed");
                        continue;
                    }
                };
                let sig = signature(&items);
                // First poll is the baseline, not a change.
                let changed = last.as_ref().is_some_and(|prev| prev != &sig);
                last = Some(sig);
                if changed {
                    let ev = FeedMutation {
                        loaded: items.len(),
                    };
                    // A full channel already carries a pending mutation.
                    if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(ev) {
                        break;
                    }
                }
            }
            tracing::debug!(target: "observer", "bridge poller stopped");
        });

        rx
    }

    async fn paginate(&self) -> Result<()> {
        self.post_action("paginate").await
    }

    async fn reload(&self) -> Result<()> {
        self.post_action("reload").await
    }

    fn name(&self) -> &str {
        &self.base
    }
}
