// ABOUTME: Sync hub composing store, arbiter and event bus
// ABOUTME: Transport-agnostic client operations: connect, disconnect, resync, commands, video load

use crate::error::UploadError;
use crate::protocol::messages::{PlaybackCommand, SyncEvent, SyncState};
use crate::server::arbiter::ControllerArbiter;
use crate::server::bus::EventBus;
use crate::server::store::StateStore;
use std::sync::Arc;

/// Entry point for everything a session can do
pub struct SyncHub {
    store: Arc<StateStore>,
    arbiter: ControllerArbiter,
    bus: Arc<dyn EventBus>,
}

impl SyncHub {
    /// Create a hub over a store and an event bus
    pub fn new(store: Arc<StateStore>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            arbiter: ControllerArbiter::new(store.clone(), bus.clone()),
            store,
            bus,
        }
    }

    /// The underlying state store
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// The controller arbiter
    pub fn arbiter(&self) -> &ControllerArbiter {
        &self.arbiter
    }

    /// The event bus
    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    /// Register a session and return the snapshot it must receive
    pub fn connect(&self, session_id: &str) -> SyncState {
        self.arbiter.on_connect(session_id);
        self.store.snapshot()
    }

    /// Deregister a session, electing a new controller if needed
    pub fn disconnect(&self, session_id: &str) -> Option<SyncEvent> {
        self.arbiter.on_disconnect(session_id)
    }

    /// Fresh reconciled snapshot
    pub fn request_sync(&self) -> SyncState {
        self.store.snapshot()
    }

    /// Apply a playback command from `session_id`
    ///
    /// Commands from anyone but the controller are dropped without feedback.
    pub fn command(&self, session_id: &str, command: PlaybackCommand) -> Option<SyncEvent> {
        if !self.arbiter.is_controller(session_id) {
            log::debug!("Ignored {:?} from non-controller {}", command.kind, session_id);
            return None;
        }

        let event = self.store.apply_command(command, session_id)?;
        log::info!(
            "Controller {} {:?} at {:.3}",
            session_id,
            command.kind,
            command.time.max(0.0)
        );
        self.bus.publish(&event);
        Some(event)
    }

    /// Check that `issuer` names a connected session, returning it trimmed
    pub fn validate_issuer<'a>(&self, issuer: &'a str) -> Result<&'a str, UploadError> {
        let issuer = issuer.trim();
        if issuer.is_empty() {
            return Err(UploadError::MissingSessionId);
        }
        if !self.store.is_member(issuer)? {
            return Err(UploadError::UnknownSession(issuer.to_string()));
        }
        Ok(issuer)
    }

    /// Make `url` the shared video with `issuer` as controller
    ///
    /// Rejects an empty resource, a missing issuer or an issuer that is not connected
    /// without touching state. Publishes `video_loaded` then `controller_change`.
    pub fn load_video(&self, url: &str, issuer: &str) -> Result<Vec<SyncEvent>, UploadError> {
        if url.trim().is_empty() {
            return Err(UploadError::MissingResource);
        }
        let issuer = self.validate_issuer(issuer)?;

        let events = self.store.reset_for_upload(url, issuer)?;
        log::info!("Video {} loaded by {}, publishing events", url, issuer);
        for event in &events {
            self.bus.publish(event);
        }
        Ok(events)
    }
}
