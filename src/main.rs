//! PINCH: market-board undercut automation
//!
//! Entry point for a dry run. Loads configuration, initialises structured
//! logging, restores lifetime stats, then drives a full seller sweep
//! against the simulated host until it finishes or Ctrl+C is pressed.

use anyhow::Result;
use secrecy::SecretString;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use pinch::config;
use pinch::engine::Orchestrator;
use pinch::humanize::HumanizationPolicy;
use pinch::notify::{WebhookClient, WebhookSink};
use pinch::ports::{LogSink, ReportSink};
use pinch::scheduler::SystemClock;
use pinch::sim::{SimHost, SimListing, SimSeller};
use pinch::storage;

/// Host frame interval.
const TICK_MS: u64 = 16;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    info!(
        mode = ?cfg.pricing.mode,
        undercut_mode = ?cfg.pricing.undercut_mode,
        undercut_amount = cfg.pricing.undercut_amount,
        max_cut = %cfg.pricing.max_cut_pct,
        "PINCH starting up (dry run)"
    );

    let sink = build_sink(&cfg)?;

    let host = demo_host();
    host.open_seller_list();

    let mut orchestrator = Orchestrator::new(
        cfg,
        host.ui(),
        host.catalog(),
        sink,
        HumanizationPolicy::default(),
        Rc::new(SystemClock::new()),
    );

    if let Some(stats) = storage::load_stats(None)? {
        orchestrator.set_lifetime_stats(stats);
    }

    orchestrator.start_seller_sweep()?;

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Entering tick loop. Press Ctrl+C to abort.");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                orchestrator.tick();
                host.pump(&mut orchestrator);
                if !orchestrator.is_busy() {
                    break;
                }
            }
            _ = &mut shutdown => {
                warn!("Shutdown signal received, aborting sweep.");
                orchestrator.abort();
                break;
            }
        }
    }

    if let Err(e) = storage::save_stats(orchestrator.lifetime_stats(), None) {
        error!(error = %e, "Failed to save stats");
    }

    for (i, seller) in host.state().sellers.iter().enumerate() {
        info!(seller = %seller.name, prices = ?host.prices(i), "Final listing prices");
    }
    info!(
        stop = ?orchestrator.last_stop(),
        humanization_score = orchestrator.humanization_score(),
        lifetime = %orchestrator.lifetime_stats(),
        "PINCH shut down cleanly."
    );

    // Let in-flight webhook posts finish.
    tokio::time::sleep(Duration::from_millis(500)).await;
    Ok(())
}

/// Webhook sink when notifications are enabled and the URL is set,
/// log-only otherwise.
fn build_sink(cfg: &config::AppConfig) -> Result<Box<dyn ReportSink>> {
    if !cfg.notifications.enabled {
        return Ok(Box::new(LogSink));
    }
    match config::AppConfig::resolve_env(&cfg.notifications.webhook_url_env) {
        Ok(url) => {
            let client = WebhookClient::new(SecretString::new(url))?;
            info!(username = %cfg.notifications.username, "Webhook notifications enabled");
            Ok(Box::new(WebhookSink::new(Arc::new(client), cfg.notifications.username.clone())?))
        }
        Err(e) => {
            warn!(error = %e, "Notifications enabled but no webhook URL, logging only");
            Ok(Box::new(LogSink))
        }
    }
}

/// Two sellers with a handful of listings and a market with some bait.
fn demo_host() -> SimHost {
    let host = SimHost::new(vec![
        SimSeller::new(
            "Retainer A",
            vec![
                SimListing::new("Cobalt Ingot", 5057, 99, 1_250),
                SimListing::new("\u{E03C}Darksteel Ore", 5118, 20, 980),
                SimListing::new("Cobalt Ingot", 5057, 99, 1_300),
            ],
        ),
        SimSeller::new("Retainer B", vec![SimListing::new("Maple Log", 5380, 99, 300)]),
    ]);
    host.set_market(5057, vec![(1_199, 99, false), (1_240, 50, false), (1_500, 99, false)]);
    host.set_market(5118, vec![(1, 20, true), (940, 20, true), (955, 10, false)]);
    host.set_market(5380, vec![(300, 99, false)]);
    host
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pinch=info"));

    let json_logging = std::env::var("PINCH_LOG_JSON").is_ok();

    if json_logging {
        fmt().json().with_env_filter(env_filter).with_target(true).with_thread_ids(true).init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
