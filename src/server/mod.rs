// ABOUTME: Server module for vidsync
// ABOUTME: Provides state store, controller arbiter, event bus, dispatcher and WebSocket transport

mod arbiter;
mod bus;
mod cli;
mod clock;
mod config;
mod dispatcher;
mod hub;
mod server;
mod session_handler;
mod session_manager;
mod state;
mod store;
mod upload;

pub use arbiter::ControllerArbiter;
pub use bus::{EventBus, LocalBus, Subscription};
pub use cli::ServerArgs;
pub use clock::{reconcile, Clock, ManualClock, SystemClock};
pub use config::ServerConfig;
pub use dispatcher::{spawn_dispatcher, Backoff, Dispatcher};
pub use hub::SyncHub;
pub use server::{AppState, SyncServer};
pub use session_handler::handle_session;
pub use session_manager::{ConnectedSession, Outbound, SessionId, SessionManager};
pub use state::{PlaybackState, Record, Sessions};
pub use store::{MemoryBackend, StateBackend, StateStore};
pub use upload::{accepted_filename, sanitize_filename};
