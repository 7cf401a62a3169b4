use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use boxtray::backend::ApiClient;
use boxtray::config::{expand_home_path, load_config, BoxConfig};
use boxtray::lifecycle::signals::wait_for_signal;
use boxtray::proxies::{latency_text, memory_text, traffic_text, ProxyRegistry};

#[derive(Parser)]
#[command(name = "boxtray-cli")]
#[command(about = "One-shot commands against a Clash-compatible controller", long_about = None)]
struct Cli {
    /// Configuration file to read the controller settings from.
    #[arg(short, long)]
    config: Option<String>,

    /// Controller host, overriding the configuration.
    #[arg(long)]
    host: Option<String>,

    /// Controller secret, overriding the configuration.
    #[arg(short, long)]
    secret: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the controller version
    Version,
    /// List selectors with their members and latency
    Proxies,
    /// Run a latency test for one node
    Delay {
        node: String,
        /// Test URL (defaults to the configured one)
        #[arg(long)]
        url: Option<String>,
        /// Timeout in milliseconds (defaults to the configured one)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Switch the active member of a selector
    Switch { selector: String, target: String },
    /// Show the controller's running settings
    Config,
    /// Change the routing mode (rule, global, direct, ...)
    Mode { mode: String },
    /// Follow memory usage until Ctrl-C
    Memory {
        /// Stop after this many samples
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
    /// Follow upload and download rates until Ctrl-C
    Traffic {
        /// Stop after this many samples
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(&expand_home_path(path))?,
        None => BoxConfig::default(),
    };
    if let Some(host) = cli.host {
        config.api.host = host;
    }
    if let Some(secret) = cli.secret {
        config.api.secret = secret;
    }

    let client = ApiClient::new(&config.api)?;

    match cli.command {
        Commands::Version => {
            let version = client.version().await?;
            println!("{}", serde_json::to_string_pretty(&version)?);
        }
        Commands::Proxies => {
            let registry = ProxyRegistry::new();
            registry.refresh(&client.fetch_topology().await?)?;
            let snapshot = registry.snapshot();

            for (name, members) in snapshot.selectors().iter() {
                println!("{}", latency_text(name, snapshot.delay(name)));
                let active = snapshot.active_member(name);
                for member in members {
                    let marker = if Some(member.name.as_str()) == active { "*" } else { " " };
                    let label = latency_text(&member.name, snapshot.delay(&member.name));
                    println!("  {} {}", marker, label);
                }
            }
        }
        Commands::Delay { node, url, timeout } => {
            let url = url.unwrap_or(config.latency.test_url);
            let timeout = timeout.unwrap_or(config.latency.timeout_ms);
            let delay = client.measure_latency(&node, &url, timeout).await?;
            println!("{}", latency_text(&node, delay));
        }
        Commands::Switch { selector, target } => {
            client.switch_active(&selector, &target).await?;
            println!("{} -> {}", selector, target);
        }
        Commands::Config => {
            let config = client.controller_config().await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Mode { mode } => {
            client.set_mode(&mode).await?;
            println!("mode -> {}", mode);
        }
        Commands::Memory { count } => {
            let cancel = interrupt_token();
            let mut seen = 0;
            client
                .stream_memory(&cancel, |memory, stop| {
                    println!("{}", memory_text(memory.inuse));
                    seen += 1;
                    if count.is_some_and(|n| seen >= n) {
                        stop.cancel();
                    }
                })
                .await?;
        }
        Commands::Traffic { count } => {
            let cancel = interrupt_token();
            let mut seen = 0;
            client
                .stream_traffic(&cancel, |traffic, stop| {
                    println!("↑ {}  ↓ {}", traffic_text(traffic.up), traffic_text(traffic.down));
                    seen += 1;
                    if count.is_some_and(|n| seen >= n) {
                        stop.cancel();
                    }
                })
                .await?;
        }
    }

    Ok(())
}

/// Token cancelled on Ctrl-C or SIGTERM.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.cancel();
    });
    token
}
