// src/feed/mod.rs
pub mod http;
pub mod scripted;
pub mod types;

pub use types::{fingerprint, FeedItem, FeedMutation, FeedSource, FINGERPRINT_CHARS, UNKNOWN_AUTHOR};
