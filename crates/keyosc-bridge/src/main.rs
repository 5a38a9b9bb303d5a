//! KeyOSC bridge entry point.
//!
//! Wires the application layer to its infrastructure and runs until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config (file, then CLI / KEYOSC_* overrides)
//!  └─ StateStore ── KeynoteController ── OsascriptBackend
//!  └─ StatusPublisher (subscribed to the store)
//!  └─ CommandRouter ── FsCatalog
//!  └─ Bridge::start()     -- binds the listener, connects the sender
//!  └─ select! { ctrl_c, /set-path config updates }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use keyosc_core::{BridgeConfig, ConfigUpdate};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use keyosc_bridge::application::control_presentation::{KeynoteController, PresentationControl};
use keyosc_bridge::application::publish_status::StatusPublisher;
use keyosc_bridge::application::route_command::{CommandRouter, PresentationCatalog};
use keyosc_bridge::application::state_store::{StateStore, StatusRefresher};
use keyosc_bridge::infrastructure::automation::OsascriptBackend;
use keyosc_bridge::infrastructure::logging::LogRing;
use keyosc_bridge::infrastructure::orchestrator::Bridge;
use keyosc_bridge::infrastructure::storage::{
    config_file_path, load_config_from, save_config_to, FsCatalog,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// OSC bridge between a show-control surface and Keynote.
///
/// Values given here override the config file for this run and are written
/// back to it when a `/set-path` command changes the configuration.
#[derive(Debug, Parser)]
#[command(name = "keyosc", version)]
struct Cli {
    /// Config file path.  Defaults to the platform config directory.
    #[arg(long, env = "KEYOSC_CONFIG")]
    config: Option<PathBuf>,

    /// UDP port to receive commands on.
    #[arg(long, env = "KEYOSC_LOCAL_PORT")]
    local_port: Option<u16>,

    /// Interface address for the listener, e.g. `127.0.0.1`.
    #[arg(long, env = "KEYOSC_BIND_ADDRESS")]
    bind_address: Option<String>,

    /// Host of the control surface receiving status.
    #[arg(long, env = "KEYOSC_REMOTE_HOST")]
    remote_host: Option<String>,

    #[arg(long, env = "KEYOSC_REMOTE_PORT")]
    remote_port: Option<u16>,

    /// Status polling period while a slideshow plays.
    #[arg(long, env = "KEYOSC_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// Directory listed by `/list`.
    #[arg(long, env = "KEYOSC_CONTENT_PATH")]
    content_path: Option<PathBuf>,

    /// OSC address prefix, e.g. `/keyosc`.
    #[arg(long, env = "KEYOSC_NAMESPACE")]
    namespace: Option<String>,

    /// Write the most recent log entries as JSON to this file on exit.
    #[arg(long, env = "KEYOSC_LOG_DUMP")]
    log_dump: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> ConfigUpdate {
        ConfigUpdate {
            local_port: self.local_port,
            bind_address: self.bind_address.clone(),
            remote_host: self.remote_host.clone(),
            remote_port: self.remote_port,
            polling_interval_ms: self.poll_interval_ms,
            content_path: self.content_path.clone(),
            namespace: self.namespace.clone(),
        }
    }

    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path().context("no --config given"),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Level is overridden by `RUST_LOG`.
    let ring = LogRing::default();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(ring.clone())
        .init();

    let cli = Cli::parse();
    let config_path = cli.config_path()?;
    let stored = load_config_from(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let config = cli.overrides().apply(&stored);

    info!(
        config = %config_path.display(),
        listen = %config.listen_addr(),
        remote = %config.remote_addr(),
        "KeyOSC starting"
    );

    let result = run(config, &config_path).await;

    if let Some(path) = &cli.log_dump {
        if let Err(e) = dump_log(&ring, path) {
            eprintln!("failed to write log dump to {}: {e:#}", path.display());
        }
    }
    result
}

async fn run(config: BridgeConfig, config_path: &std::path::Path) -> anyhow::Result<()> {
    // ── Application layer ─────────────────────────────────────────────────────
    let store = Arc::new(StateStore::new(config.polling_interval()));
    let controller = Arc::new(KeynoteController::new(
        Arc::new(OsascriptBackend::new()),
        Arc::clone(&store),
    ));
    let refresher: Arc<dyn StatusRefresher> = controller.clone();
    store.set_refresher(&refresher);

    let catalog: Arc<dyn PresentationCatalog> =
        Arc::new(FsCatalog::new(config.content_path.clone()));
    let publisher = Arc::new(StatusPublisher::new(config.namespace_prefix()));
    let _subscription = publisher.subscribe(&store);

    let (config_tx, mut config_rx) = mpsc::unbounded_channel::<ConfigUpdate>();
    let router = Arc::new(
        CommandRouter::new(
            controller.clone(),
            Arc::clone(&catalog),
            Arc::clone(&publisher),
            config.namespace_prefix(),
        )
        .with_config_updates(config_tx),
    );

    // ── Infrastructure ────────────────────────────────────────────────────────
    let mut bridge = Bridge::new(config, router, publisher, Arc::clone(&store), catalog);
    bridge
        .start()
        .await
        .context("failed to start OSC listener")?;

    let initial = controller.check_status().await;
    info!(
        document = initial.document.as_deref().unwrap_or("-"),
        playing = initial.playing,
        "initial status"
    );

    info!("KeyOSC ready.  Press Ctrl-C to exit.");
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!(error = %e, "failed to listen for Ctrl-C");
                }
                info!("shutdown signal received");
                break;
            }
            Some(update) = config_rx.recv() => {
                if let Err(e) = bridge.update_config(&update).await {
                    warn!(error = %e, "configuration update rejected");
                    continue;
                }
                if let Err(e) = save_config_to(config_path, bridge.config()) {
                    warn!(error = %e, "failed to persist configuration");
                }
            }
        }
    }

    bridge.stop().await;
    store.stop_polling();
    info!("KeyOSC stopped");
    Ok(())
}

fn dump_log(ring: &LogRing, path: &std::path::Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&ring.entries())?;
    std::fs::write(path, json)?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
