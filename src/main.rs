//! boxtray daemon.
//!
//! Runs the tray core headless: polls the controller, logs every
//! notification, and reloads the proxy topology whenever the controller
//! comes back up.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌────────────┐  probe   ┌────────────────┐  events  ┌────────────┐
//!   │ controller │◀─────────│ status monitor │─────────▶│  notifier  │
//!   │    API     │          └────────────────┘          └─────┬──────┘
//!   └─────┬──────┘                                            │ per-subscriber
//!         │ topology / delay                                  ▼ queues
//!         │                 ┌────────────────┐          ┌────────────┐
//!         └────────────────▶│ proxy registry │◀─────────│ subscribers│
//!                           └────────────────┘ refresh  └────────────┘
//! ```

use std::sync::Arc;

use clap::Parser;
use tokio::task::JoinHandle;

use boxtray::config::{expand_home_path, load_config, BoxConfig};
use boxtray::events::Event;
use boxtray::lifecycle::{signals, Shutdown};
use boxtray::observability::logging::init_logging;
use boxtray::proxies::latency_text;
use boxtray::Engine;

const CONSOLE_SUBSCRIBER: &str = "console";

#[derive(Parser)]
#[command(name = "boxtray")]
#[command(about = "Health monitor for a Clash-compatible controller", long_about = None)]
struct Args {
    /// Path to the configuration file (TOML or JSON).
    #[arg(short, long, default_value = "~/.config/boxtray/config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let path = expand_home_path(&args.config);
    let found = path.exists();
    let config = if found { load_config(&path)? } else { BoxConfig::default() };

    init_logging(&config.log)?;

    tracing::info!("boxtray v{} starting", env!("CARGO_PKG_VERSION"));
    if !found {
        tracing::warn!(path = %path.display(), "Config file not found, using defaults");
    }
    tracing::info!(
        endpoint = %config.api.endpoint(),
        interval_ms = config.monitor.interval_ms,
        "Configuration loaded"
    );

    let engine = Arc::new(Engine::new(config)?);
    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let console = spawn_console_observer(engine.clone());
    engine.start(&shutdown).await;

    shutdown.triggered().await;

    engine.stop().await;
    engine.unsubscribe(CONSOLE_SUBSCRIBER);
    if let Err(e) = console.await {
        tracing::error!(error = %e, "Console observer failed");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Log notifications and reload proxies on every down→up transition.
fn spawn_console_observer(engine: Arc<Engine>) -> JoinHandle<()> {
    let mut queue = engine.subscribe(CONSOLE_SUBSCRIBER);

    tokio::spawn(async move {
        while let Some(event) = queue.recv().await {
            match event {
                Event::Error { cause } => {
                    tracing::error!(error = %cause, "Status check failed");
                }
                Event::Status(change) if change.up && change.transitioned_from_down => {
                    tracing::info!("Controller available, loading proxies");
                    match engine.refresh_from_backend().await {
                        Ok(snapshot) => {
                            for (name, members) in snapshot.selectors().iter() {
                                tracing::info!(
                                    selector = %latency_text(name, snapshot.delay(name)),
                                    active = snapshot.active_member(name).unwrap_or_default(),
                                    members = members.len(),
                                    "Selector loaded"
                                );
                            }
                        }
                        Err(e) => tracing::error!(error = %e, "Refresh proxies failed"),
                    }
                }
                Event::Status(change) if !change.up => {
                    tracing::warn!("Controller unavailable");
                }
                Event::Status(_) => {}
            }
        }
    })
}
