//! # Delivery Client
//! Fire-and-forget forwarding of matched items to the ingestion endpoint.
//!
//! `send` never blocks the caller: the HTTP request runs on its own task,
//! its outcome is logged and counted, and nothing is retried or queued.

use anyhow::{Context, Result};
use metrics::counter;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

use crate::feed::FeedItem;

/// JSON body expected by `POST <base>/api/<topic>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryPayload {
    pub tweet_id: String,
    pub author_handle: String,
    pub text: String,
    pub url: Option<String>,
    pub posted_at: Option<String>,
}

impl DeliveryPayload {
    /// Missing ids fall back to the observation time in millis.
    pub fn from_item(item: &FeedItem, now_ms: i64) -> Self {
        Self {
            tweet_id: item
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| now_ms.to_string()),
            author_handle: item.author.trim_start_matches('@').to_string(),
            text: item.text.clone(),
            url: item.url.clone().filter(|u| !u.is_empty()),
            posted_at: item.posted_at.clone().filter(|t| !t.is_empty()),
        }
    }
}

pub trait Deliver: Send + Sync {
    /// Dispatch and return immediately.
    fn send(&self, payload: DeliveryPayload);
    fn name(&self) -> &'static str;
}

#[derive(Clone)]
pub struct HttpDelivery {
    endpoint: String,
    client: Client,
    timeout: Duration,
}

impl HttpDelivery {
    pub fn new(api_base: &str, topic: &str) -> Self {
        Self {
            endpoint: endpoint_for(api_base, topic),
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs.max(1));
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// One request, no retry. Non-2xx is an error.
    pub async fn post(&self, payload: &DeliveryPayload) -> Result<()> {
        self.client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .context("ingest post")?
            .error_for_status()
            .context("ingest non-2xx")?;
        Ok(())
    }
}

pub fn endpoint_for(api_base: &str, topic: &str) -> String {
    format!(
        "{}/api/{}",
        api_base.trim_end_matches('/'),
        topic.trim_matches('/')
    )
}

impl Deliver for HttpDelivery {
    fn send(&self, payload: DeliveryPayload) {
        let this = self.clone();
        tokio::spawn(async move {
            match this.post(&payload).await {
                Ok(()) => {
                    counter!("monitor_delivery_ok_total").increment(1);
                    tracing::info!(
                        target: "delivery",
                        author = %payload.author_handle,
                        id = %payload.tweet_id,
                        "sent to ingest"
                    );
                }
                Err(e) => {
                    counter!("monitor_delivery_failed_total").increment(1);
                    tracing::warn!(
                        target: "delivery",
                        endpoint = %this.endpoint,
                        id = %payload.tweet_id,
                        "ingest delivery failed: {e:#}"
                    );
                }
            }
        });
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Logs instead of sending; used with `--dry-run`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunSink;

impl Deliver for DryRunSink {
    fn send(&self, payload: DeliveryPayload) {
        tracing::info!(
            target: "delivery",
            author = %payload.author_handle,
            id = %payload.tweet_id,
            posted_at = ?payload.posted_at,
            "dry-run: would deliver"
        );
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}

// --- Test helper ---
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<DeliveryPayload>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("recording sink mutex poisoned")
            .iter()
            .map(|p| p.tweet_id.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().expect("recording sink mutex poisoned").len()
    }
}

impl Deliver for RecordingSink {
    fn send(&self, payload: DeliveryPayload) {
        self.sent
            .lock()
            .expect("recording sink mutex poisoned")
            .push(payload);
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
