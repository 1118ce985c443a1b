// ABOUTME: Main vidsync server implementation
// ABOUTME: Provides WebSocket and upload endpoints and coordinates all server components

use crate::server::bus::{EventBus, LocalBus};
use crate::server::clock::{Clock, SystemClock};
use crate::server::config::ServerConfig;
use crate::server::dispatcher::{spawn_dispatcher, Backoff};
use crate::server::hub::SyncHub;
use crate::server::session_handler::handle_session;
use crate::server::session_manager::SessionManager;
use crate::server::store::{MemoryBackend, StateBackend, StateStore};
use crate::server::upload::upload_handler;
use axum::{
    extract::ws::WebSocketUpgrade,
    extract::{ConnectInfo, DefaultBodyLimit, State},
    response::IntoResponse,
    routing::{any, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<ServerConfig>,
    /// Client-facing sync operations
    pub hub: Arc<SyncHub>,
    /// Sessions attached to this process
    pub sessions: Arc<SessionManager>,
}

/// vidsync server
pub struct SyncServer {
    /// Server configuration
    config: Arc<ServerConfig>,
    /// State store
    store: Arc<StateStore>,
    /// Event bus
    bus: Arc<dyn EventBus>,
    /// Client-facing sync operations
    hub: Arc<SyncHub>,
    /// Session manager
    sessions: Arc<SessionManager>,
}

impl SyncServer {
    /// Create a new server with default configuration
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a new server with an in-memory store and local event bus
    pub fn with_config(config: ServerConfig) -> Self {
        let bus = Arc::new(LocalBus::new(config.bus_capacity));
        Self::with_parts(
            config,
            Arc::new(MemoryBackend::new()),
            Arc::new(SystemClock),
            bus,
        )
    }

    /// Create a new server over an explicit store backend, clock and event bus
    pub fn with_parts(
        config: ServerConfig,
        backend: Arc<dyn StateBackend>,
        clock: Arc<dyn Clock>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        let store = Arc::new(StateStore::new(backend, clock));
        let hub = Arc::new(SyncHub::new(store.clone(), bus.clone()));
        Self {
            config: Arc::new(config),
            store,
            bus,
            hub,
            sessions: Arc::new(SessionManager::new()),
        }
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the sync hub
    pub fn hub(&self) -> Arc<SyncHub> {
        Arc::clone(&self.hub)
    }

    /// Get the session manager
    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }

    /// Build the HTTP router
    pub fn router(&self) -> Router {
        let state = AppState {
            config: self.config.clone(),
            hub: self.hub.clone(),
            sessions: self.sessions.clone(),
        };
        let video_route = self.config.video_route.trim_end_matches('/');

        Router::new()
            .route(&self.config.ws_path, any(ws_handler))
            .route(
                &self.config.upload_path,
                post(upload_handler).layer(DefaultBodyLimit::max(self.config.max_upload_bytes)),
            )
            .nest_service(video_route, ServeDir::new(&self.config.upload_dir))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until Ctrl-C
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;

        // Setup graceful shutdown
        let shutdown_signal = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => log::info!("Received shutdown signal"),
                Err(e) => {
                    log::error!("Failed to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        self.serve(listener, shutdown_signal).await
    }

    /// Serve on `listener` until `shutdown` resolves
    ///
    /// Wipes the store on start and clears it again after shutdown.
    pub async fn serve<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        log::info!("Initializing playback state...");
        if let Err(e) = self.store.initialize() {
            log::error!("Failed to initialize playback state: {}", e);
        }

        let (dispatcher_handle, dispatcher_shutdown) = spawn_dispatcher(
            self.bus.clone(),
            self.sessions.clone(),
            Backoff::new(
                self.config.resubscribe_backoff,
                self.config.max_resubscribe_backoff,
            ),
        );

        let app = self.router();
        log::info!(
            "vidsync server listening on {} (endpoint: {})",
            listener.local_addr()?,
            self.config.ws_path
        );

        // Run server with graceful shutdown
        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        // Shutdown dispatcher and detach sessions
        self.sessions.close_all();
        let _ = dispatcher_shutdown.send(true);
        let _ = dispatcher_handle.await;

        if let Err(e) = self.store.clear() {
            log::warn!("Failed to clear playback state: {}", e);
        }

        log::info!("Server shutdown complete");
        result.map_err(Into::into)
    }
}

impl Default for SyncServer {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        handle_session(
            socket,
            Some(remote_addr),
            state.hub,
            state.sessions,
            state.config,
        )
    })
}
