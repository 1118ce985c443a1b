// ABOUTME: Example vidsync server
// ABOUTME: Demonstrates embedding the server and watching its event bus

use clap::Parser;
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vidsync::server::{ServerConfig, SyncServer};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "127.0.0.1:5000")]
    bind: SocketAddr,

    /// Directory uploaded videos are stored in
    #[arg(long, default_value = "static/videos")]
    upload_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vidsync=info,server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    tracing::info!("Starting vidsync server...");
    tracing::info!("  Bind address: {}", args.bind);
    tracing::info!("  Upload dir: {}", args.upload_dir.display());

    let config = ServerConfig::new()
        .bind_addr(args.bind)
        .upload_dir(args.upload_dir);
    let server = SyncServer::with_config(config);

    // Watch the bus alongside the dispatcher
    let mut events = server.hub().bus().subscribe()?;
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => tracing::info!("event: {:?}", event),
                Err(e) => tracing::warn!("bus: {}", e),
            }
        }
    });

    tracing::info!("Server ready. Connect with `vidsync --server ws://{}/ws`", args.bind);

    server.run().await
}
