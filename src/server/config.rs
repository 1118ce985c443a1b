// ABOUTME: Server configuration
// ABOUTME: Defines configurable parameters for the vidsync server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// WebSocket endpoint path
    pub ws_path: String,
    /// Upload endpoint path
    pub upload_path: String,
    /// Route prefix under which stored videos are served
    pub video_route: String,
    /// Directory uploaded videos are written to
    pub upload_dir: PathBuf,
    /// Accepted upload extensions (lowercase, without dot)
    pub allowed_extensions: Vec<String>,
    /// Maximum upload body size in bytes
    pub max_upload_bytes: usize,
    /// Interval between heartbeat pings
    pub ping_interval: Duration,
    /// Drop a session after this long without any inbound frame
    pub ping_timeout: Duration,
    /// Initial delay before resubscribing to the event bus
    pub resubscribe_backoff: Duration,
    /// Upper bound on the resubscribe delay
    pub max_resubscribe_backoff: Duration,
    /// Undelivered events retained per bus subscriber
    pub bus_capacity: usize,
}

impl ServerConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the WebSocket path
    pub fn ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    /// Set the upload directory
    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    /// Set the maximum upload size in bytes
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    /// Set the heartbeat ping interval and timeout
    pub fn heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.ping_interval = interval;
        self.ping_timeout = timeout;
        self
    }

    /// Set the initial resubscribe backoff
    pub fn resubscribe_backoff(mut self, backoff: Duration) -> Self {
        self.resubscribe_backoff = backoff;
        self
    }

    /// Whether `extension` is an accepted upload type
    pub fn is_allowed_extension(&self, extension: &str) -> bool {
        let extension = extension.to_ascii_lowercase();
        self.allowed_extensions.iter().any(|allowed| *allowed == extension)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            ws_path: "/ws".to_string(),
            upload_path: "/upload".to_string(),
            video_route: "/videos".to_string(),
            upload_dir: PathBuf::from("static/videos"),
            allowed_extensions: vec!["mp4".to_string(), "webm".to_string(), "ogg".to_string()],
            max_upload_bytes: 500 * 1024 * 1024,
            ping_interval: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(10),
            resubscribe_backoff: Duration::from_secs(2),
            max_resubscribe_backoff: Duration::from_secs(30),
            bus_capacity: 1024,
        }
    }
}
