// ABOUTME: CLI argument parsing and server builder utilities
// ABOUTME: Turns command-line flags into tracing setup and a ServerConfig

use crate::server::ServerConfig;
use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server arguments
///
/// Use with `#[command(flatten)]` in your binary's Args struct:
/// ```ignore
/// #[derive(Parser)]
/// struct MyArgs {
///     #[command(flatten)]
///     server: ServerArgs,
/// }
/// ```
#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Address to bind the server to
    #[arg(short, long, default_value = "0.0.0.0:5000")]
    pub bind: SocketAddr,

    /// WebSocket endpoint path
    #[arg(long, default_value = "/ws")]
    pub path: String,

    /// Directory uploaded videos are stored in
    #[arg(long, default_value = "static/videos")]
    pub upload_dir: PathBuf,

    /// Maximum upload size in megabytes
    #[arg(long, default_value = "500")]
    pub max_upload_mb: usize,

    /// Heartbeat ping interval in seconds
    #[arg(long, default_value = "5")]
    pub ping_interval: u64,

    /// Drop sessions silent for this many seconds
    #[arg(long, default_value = "10")]
    pub ping_timeout: u64,

    /// Initial event bus resubscribe delay in milliseconds
    #[arg(long, default_value = "2000")]
    pub resubscribe_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServerArgs {
    /// Initialize tracing based on verbosity flag
    pub fn init_tracing(&self) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let filter = if self.verbose {
            "vidsync=debug,tower_http=debug"
        } else {
            "vidsync=info"
        };

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| filter.into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    /// Log startup information
    pub fn log_startup_info(&self) {
        tracing::info!("vidsync server v{}", env!("CARGO_PKG_VERSION"));
        tracing::info!("Bind: {}", self.bind);
        tracing::info!("Endpoint: ws://{}{}", self.bind, self.path);
        tracing::info!("Uploads: {}", self.upload_dir.display());
        tracing::info!(
            "Heartbeat: ping every {}s, timeout {}s",
            self.ping_interval,
            self.ping_timeout
        );
    }

    /// Build ServerConfig from these args
    pub fn build_config(&self) -> ServerConfig {
        ServerConfig::new()
            .bind_addr(self.bind)
            .ws_path(self.path.clone())
            .upload_dir(self.upload_dir.clone())
            .max_upload_bytes(self.max_upload_mb.saturating_mul(1024 * 1024))
            .heartbeat(
                Duration::from_secs(self.ping_interval.max(1)),
                Duration::from_secs(self.ping_timeout.max(1)),
            )
            .resubscribe_backoff(Duration::from_millis(self.resubscribe_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestArgs {
        #[command(flatten)]
        server: ServerArgs,
    }

    #[test]
    fn test_default_args() {
        let args = TestArgs::parse_from(["vidsync-server"]).server;

        assert_eq!(args.bind.port(), 5000);
        assert_eq!(args.path, "/ws");
        assert_eq!(args.ping_interval, 5);
        assert_eq!(args.ping_timeout, 10);
        assert!(!args.verbose);
    }

    #[test]
    fn test_build_config() {
        let args = TestArgs::parse_from([
            "vidsync-server",
            "--bind",
            "127.0.0.1:9000",
            "--path",
            "/sync",
            "--max-upload-mb",
            "2",
            "--ping-timeout",
            "30",
            "--resubscribe-ms",
            "250",
        ])
        .server;

        let config = args.build_config();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.ws_path, "/sync");
        assert_eq!(config.max_upload_bytes, 2 * 1024 * 1024);
        assert_eq!(config.ping_timeout, Duration::from_secs(30));
        assert_eq!(config.resubscribe_backoff, Duration::from_millis(250));
    }
}
