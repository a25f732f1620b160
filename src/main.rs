//! Feed Monitor — Binary Entrypoint
//! Loads the monitor config, attaches to the feed bridge and runs monitor
//! sessions until interrupted.
//!
//! Flags: `--config <path>`, `--dry-run` (log instead of delivering),
//! `--reset` (forget persisted cache + state for the configured feed, then exit).

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feed_monitor::config::{load_config_default, load_config_from, MonitorConfig};
use feed_monitor::feed::http::HttpFeedSource;
use feed_monitor::feed::FeedSource;
use feed_monitor::history::RecentDeliveries;
use feed_monitor::metrics::Metrics;
use feed_monitor::state::{FileStore, KvStore, MemoryStore, StateStore};
use feed_monitor::{api, build_controller, scheduler, session_cfg, MatchMode, Monitor};

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    dry_run: bool,
    reset: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--config" => {
                let p = it.next().ok_or_else(|| anyhow!("--config needs a path"))?;
                args.config = Some(PathBuf::from(p));
            }
            "--dry-run" => args.dry_run = true,
            "--reset" => args.reset = true,
            other => return Err(anyhow!("unknown argument: {other}")),
        }
    }
    Ok(args)
}

/// Compact logs by default; `LOG_FORMAT=json` for structured output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(
            "feed_monitor=info,monitor=info,backfill=info,delivery=info,observer=info,scheduler=info,warn",
        ));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

fn watching_line(cfg: &MonitorConfig) -> String {
    match cfg.match_mode {
        MatchMode::PassThrough => "scraping all items (no keywords)".to_string(),
        mode => format!(
            "watching {} keyword(s), {}",
            cfg.keywords.len(),
            mode.as_str()
        ),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let args = parse_args()?;
    let cfg = match &args.config {
        Some(p) => load_config_from(p)?,
        None => load_config_default()?,
    };
    if args.reset {
        let kv: Arc<dyn KvStore> = Arc::new(FileStore::new(cfg.state_dir.clone()));
        let store = StateStore::new(kv, &cfg.feed_key());
        store.reset().await.context("resetting monitor state")?;
        tracing::info!(feed = %cfg.feed_key(), "seen cache and catch-up state removed");
        return Ok(());
    }

    let bridge = cfg
        .bridge_url
        .clone()
        .ok_or_else(|| anyhow!("config must include bridge_url for the feed adapter"))?;
    let feed: Arc<dyn FeedSource> =
        Arc::new(HttpFeedSource::new(bridge).with_poll_interval(Duration::from_millis(cfg.poll_ms)));

    // Dry runs leave the persisted cache and state untouched.
    let kv: Arc<dyn KvStore> = if args.dry_run {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(FileStore::new(cfg.state_dir.clone()))
    };

    let history = Arc::new(RecentDeliveries::default());
    let controller = Arc::new(build_controller(&cfg, kv, history.clone(), args.dry_run).await?);

    tracing::info!(
        monitor = %cfg.display_name(),
        feed_url = %cfg.feed_url,
        feed_key = %cfg.feed_key(),
        endpoint = %format!("{}/api/{}", cfg.api_base.trim_end_matches('/'), cfg.topic),
        dry_run = args.dry_run,
        "monitor starting"
    );

    if let Some(addr) = &cfg.status_addr {
        let metrics = Metrics::init()?;
        let state = api::AppState {
            monitor: cfg.display_name(),
            controller: controller.clone(),
            history: history.clone(),
        };
        api::serve(addr, api::router(state, Some(&metrics))).await?;
    } else {
        feed_monitor::metrics::describe_all();
    }

    let sched = cfg.scheduler_cfg();
    let heartbeat = scheduler::spawn_heartbeat(sched.heartbeat, cfg.display_name(), watching_line(&cfg));

    let monitor = Monitor::new(feed, controller, session_cfg(&cfg));
    tokio::select! {
        _ = monitor.run_forever() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("stopping monitor");
        }
    }
    heartbeat.abort();
    Ok(())
}
