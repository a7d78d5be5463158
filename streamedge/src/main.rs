mod http;

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use streamedge_core::{logging, Config, EdgeCore};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::http::{create_router, AppState};

#[derive(Parser, Debug)]
#[command(name = "streamedge")]
#[command(about = "Edge cache for live HLS streams", long_about = None)]
struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(long, env = "STREAMEDGE_CONFIG")]
    config: Option<String>,

    /// HTTP listen address, overrides server.host / server.http_port
    #[arg(long)]
    http_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    logging::init_logging(&config.logging)?;

    info!("streamedge v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(errors) = config.validate() {
        for problem in &errors {
            error!("Invalid configuration: {}", problem);
        }
        anyhow::bail!("Configuration has {} problem(s)", errors.len());
    }

    let edge = Arc::new(EdgeCore::from_config(&config).await?);
    edge.start();

    let http_addr = args.http_addr.unwrap_or_else(|| config.http_address());
    let listener = TcpListener::bind(&http_addr).await?;
    info!("HTTP server listening on {}", http_addr);

    let app = create_router(AppState::new(Arc::clone(&edge)));
    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    edge.shutdown().await;

    if let Err(e) = served {
        error!("HTTP server error: {}", e);
        return Err(e.into());
    }

    info!("streamedge stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down..."),
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
