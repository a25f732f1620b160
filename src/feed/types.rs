// src/feed/types.rs
use anyhow::Result;
use tokio::sync::mpsc;

/// Author placeholder when the handle cannot be resolved.
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// Leading characters of `text` that identify an item for dedup purposes.
pub const FINGERPRINT_CHARS: usize = 120;

fn default_author() -> String {
    UNKNOWN_AUTHOR.to_string()
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FeedItem {
    #[serde(default)]
    pub id: Option<String>, // platform status id
    #[serde(default = "default_author")]
    pub author: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, alias = "postedAt")]
    pub posted_at: Option<String>, // ISO-8601
}

impl FeedItem {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            author: default_author(),
            text: text.into(),
            url: None,
            posted_at: None,
        }
    }

    pub fn posted(mut self, ts: impl Into<String>) -> Self {
        self.posted_at = Some(ts.into());
        self
    }

    pub fn by(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Dedup identity. Two items sharing the same leading text collide.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.text)
    }
}

pub fn fingerprint(text: &str) -> String {
    text.chars().take(FINGERPRINT_CHARS).collect()
}

/// Raised by a feed whenever its materialized content changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedMutation {
    pub loaded: usize,
}

/// Capability the monitor needs from whatever renders the watched feed.
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    /// Items currently materialized, in feed (display) order.
    async fn snapshot(&self) -> Result<Vec<FeedItem>>;

    /// Fresh mutation subscription. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> mpsc::Receiver<FeedMutation>;

    /// Ask the feed to materialize older content.
    async fn paginate(&self) -> Result<()>;

    /// Full reload of the feed view.
    async fn reload(&self) -> Result<()>;

    /// Size of the loaded content; used to notice the bottom of the feed.
    async fn loaded_size(&self) -> Result<usize> {
        Ok(self.snapshot().await?.len())
    }

    fn name(&self) -> &str;
}
