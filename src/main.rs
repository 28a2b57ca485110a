//! Line Chat Server - Entry Point
//!
//! Starts the TCP listener and the ChatServer accept loop.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use line_chat::{ChatServer, ServerConfig, TracingAuditSink};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=line_chat=trace,audit=info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("line_chat=info,audit=info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Start TCP listener
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(
        idle_timeout_secs = config.idle_timeout.as_secs(),
        "chat server listening on {}", addr
    );

    let server = ChatServer::new(config, Arc::new(TracingAuditSink));

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutting down gracefully");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    server.run(listener).await;
    Ok(())
}
