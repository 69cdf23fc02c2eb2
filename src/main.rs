//! Edge gateway binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ http::dispatch
//!                       (request id,     │ security::identity
//!                        trace)          │ routing::RouteTable
//!                                        │ security::rate_limit
//!                                        ▼
//!                              resilience::RetryExecutor
//!                               │ circuit_breaker (per service)
//!                               │ request budget, timeouts / backoff
//!                               ▼
//!                          upstream::HyperClient ──────▶ Downstream service
//!
//!     Background: rate-limit sweeper, health monitor, admin API, Prometheus
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use edge_gateway::config::{load_config, GatewayConfig};
use edge_gateway::lifecycle::signals::shutdown_on_signal;
use edge_gateway::observability::{logging, metrics};
use edge_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "edge-gateway")]
#[command(about = "Edge gateway: routing, rate limiting and failure isolation for downstream services", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config: GatewayConfig = load_config(&args.config)?;
    if args.check {
        println!(
            "{}: OK ({} services, {} routes)",
            args.config.display(),
            config.services.len(),
            config.routes.len()
        );
        return Ok(());
    }

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        services = config.services.len(),
        routes = config.routes.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
