//! Layer-4 TCP load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │                 LOAD BALANCER                │
//!   Client TCP         │  ┌──────────┐   events   ┌────────────────┐  │
//!   ───────────────────┼─▶│ listener │───────────▶│  control loop  │  │
//!                      │  └──────────┘            │  (balancer)    │  │
//!                      │  ┌──────────┐   events   │  queue, pool,  │  │
//!                      │  │ streams  │◀──────────▶│  sessions      │  │
//!                      │  └──────────┘            └───────┬────────┘  │
//!                      │  ┌──────────┐   events           │ dial      │
//!                      │  │  timers  │───────────▶        ▼           │
//!                      │  └──────────┘            ┌────────────────┐  │    Backend
//!                      │                          │    dialers     │──┼──▶ nodes
//!                      │                          └────────────────┘  │
//!                      └──────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use l4_balancer::config::{loader, BalancerConfig, LogFormat};
use l4_balancer::lifecycle::{signals, startup, Shutdown};
use l4_balancer::observability::{logging, metrics};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
}

#[derive(Parser)]
#[command(name = "l4-balancer")]
#[command(about = "Layer-4 TCP load balancer with health checking", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log format.
    #[arg(long, value_enum)]
    log_format: Option<LogFormatArg>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => loader::load_config(path)?,
        None => BalancerConfig::default(),
    };
    if let Some(format) = cli.log_format {
        config.observability.log_format = match format {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        };
    }

    logging::init_logging(&config.observability);
    tracing::info!("l4-balancer v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        nodes = config.nodes.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = startup::bind(&config).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    startup::run(&config, listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
