// src/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backfill::BackfillCfg;
use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::matcher::{MatchMode, MatchRules};
use crate::scheduler::SchedulerCfg;

pub const ENV_CONFIG_PATH: &str = "FEED_MONITOR_CONFIG";
pub const ENV_API_BASE: &str = "FEED_MONITOR_API_BASE";
pub const ENV_STATE_DIR: &str = "FEED_MONITOR_STATE_DIR";

fn default_refresh_minutes() -> u64 {
    1
}
fn default_catch_up_minutes() -> i64 {
    5
}
fn default_cache_size() -> usize {
    DEFAULT_CACHE_CAPACITY
}
fn default_debounce_ms() -> u64 {
    400
}
fn default_heartbeat_secs() -> u64 {
    30
}
fn default_initial_delay_ms() -> u64 {
    2000
}
fn default_scroll_wait_ms() -> u64 {
    1800
}
fn default_max_scroll_steps() -> usize {
    50
}
fn default_seed_scroll_steps() -> usize {
    6
}
fn default_api_base() -> String {
    "http://localhost:8765".to_string()
}
fn default_topic() -> String {
    "tweet".to_string()
}
fn default_poll_ms() -> u64 {
    1000
}
fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}
fn default_delivery_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub name: String,
    pub feed_url: String,
    /// Storage namespace; derived from `feed_url` when absent.
    #[serde(default)]
    pub feed_id: Option<String>,
    /// Keeps several monitors of one feed apart (e.g. "ScrapeAll").
    #[serde(default)]
    pub storage_suffix: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub match_mode: MatchMode,

    #[serde(default = "default_refresh_minutes")]
    pub refresh_minutes: u64,
    #[serde(default = "default_catch_up_minutes")]
    pub catch_up_threshold_minutes: i64,
    #[serde(default = "default_cache_size")]
    pub max_cache_size: usize,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_scroll_wait_ms")]
    pub scroll_wait_ms: u64,
    #[serde(default = "default_max_scroll_steps")]
    pub max_scroll_steps: usize,
    #[serde(default = "default_seed_scroll_steps")]
    pub seed_scroll_steps: usize,

    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,

    /// Rendering bridge for the HTTP feed adapter.
    #[serde(default)]
    pub bridge_url: Option<String>,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// e.g. "127.0.0.1:8780"; status surface is off when absent.
    #[serde(default)]
    pub status_addr: Option<String>,
}

impl MonitorConfig {
    /// Storage key for this monitor's cache and state.
    pub fn feed_key(&self) -> String {
        let base = self
            .feed_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| list_id_from_url(&self.feed_url))
            .unwrap_or_else(|| "default".to_string());
        match self.storage_suffix.as_deref().map(str::trim) {
            Some(sfx) if !sfx.is_empty() => format!("{base}_{sfx}"),
            _ => base,
        }
    }

    pub fn display_name(&self) -> String {
        if self.name.trim().is_empty() {
            self.feed_key()
        } else {
            self.name.clone()
        }
    }

    pub fn match_rules(&self) -> Result<MatchRules> {
        match self.match_mode {
            MatchMode::PassThrough => Ok(MatchRules::pass_through()),
            mode => MatchRules::new(&self.keywords, mode),
        }
    }

    pub fn backfill_cfg(&self) -> BackfillCfg {
        BackfillCfg {
            step_wait: Duration::from_millis(self.scroll_wait_ms),
            max_steps: self.max_scroll_steps,
            seed_steps: self.seed_scroll_steps,
            ..BackfillCfg::default()
        }
    }

    pub fn scheduler_cfg(&self) -> SchedulerCfg {
        SchedulerCfg {
            heartbeat: Duration::from_secs(self.heartbeat_secs),
            refresh: Duration::from_secs(self.refresh_minutes * 60),
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    fn sanitize(mut self) -> Result<Self> {
        self.feed_url = self.feed_url.trim().to_string();
        if self.feed_url.is_empty() {
            bail!("config must include feed_url");
        }
        self.keywords = clean_list(std::mem::take(&mut self.keywords));
        if self.keywords.is_empty() && self.match_mode != MatchMode::PassThrough {
            bail!("config must include keywords (or match_mode = \"pass-through\")");
        }
        self.refresh_minutes = self.refresh_minutes.max(1);
        self.catch_up_threshold_minutes = self.catch_up_threshold_minutes.max(1);
        self.max_cache_size = self.max_cache_size.max(1);
        self.heartbeat_secs = self.heartbeat_secs.max(1);
        self.max_scroll_steps = self.max_scroll_steps.max(1);
        self.topic = self.topic.trim().trim_matches('/').to_string();
        if self.topic.is_empty() {
            self.topic = default_topic();
        }
        Ok(self)
    }

    fn apply_env(mut self) -> Self {
        if let Ok(base) = std::env::var(ENV_API_BASE) {
            if !base.trim().is_empty() {
                self.api_base = base.trim().to_string();
            }
        }
        if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
            if !dir.trim().is_empty() {
                self.state_dir = PathBuf::from(dir.trim());
            }
        }
        self
    }
}

/// `https://x.com/i/lists/52021139` → `52021139`.
pub fn list_id_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let mut parts = path.trim_end_matches('/').rsplit('/');
    let last = parts.next()?;
    let prev = parts.next()?;
    if prev == "lists" && !last.is_empty() {
        Some(last.to_string())
    } else {
        None
    }
}

/// Load config from an explicit path. Supports TOML or JSON.
pub fn load_config_from(path: &Path) -> Result<MonitorConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading monitor config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
        .with_context(|| format!("parsing {}", path.display()))?
        .apply_env()
        .sanitize()
}

/// Load config using env var + fallbacks:
/// 1) $FEED_MONITOR_CONFIG
/// 2) config/monitor.toml
/// 3) config/monitor.json
pub fn load_config_default() -> Result<MonitorConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        } else {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/monitor.toml");
    if toml_p.exists() {
        return load_config_from(&toml_p);
    }
    let json_p = PathBuf::from("config/monitor.json");
    if json_p.exists() {
        return load_config_from(&json_p);
    }
    Err(anyhow!(
        "no monitor config found (set {ENV_CONFIG_PATH} or create config/monitor.toml)"
    ))
}

fn parse_config(s: &str, hint_ext: &str) -> Result<MonitorConfig> {
    match hint_ext {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        _ => {
            if let Ok(v) = serde_json::from_str(s) {
                return Ok(v);
            }
            toml::from_str(s).map_err(|e| anyhow!("unsupported monitor config format: {e}"))
        }
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}
