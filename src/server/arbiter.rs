// ABOUTME: Controller arbiter
// ABOUTME: Tracks membership, authorizes command issuers and elects a new controller on disconnect

use crate::protocol::messages::SyncEvent;
use crate::server::bus::EventBus;
use crate::server::store::StateStore;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Decides who may drive playback
pub struct ControllerArbiter {
    store: Arc<StateStore>,
    bus: Arc<dyn EventBus>,
}

impl ControllerArbiter {
    /// Create an arbiter over `store`, announcing elections on `bus`
    pub fn new(store: Arc<StateStore>, bus: Arc<dyn EventBus>) -> Self {
        Self { store, bus }
    }

    /// Register a new session; never changes the controller
    pub fn on_connect(&self, session_id: &str) {
        if let Err(e) = self.store.add_session(session_id) {
            log::error!("Failed to register session {}: {}", session_id, e);
        }
    }

    /// Deregister a session, electing a replacement if it was the controller
    pub fn on_disconnect(&self, session_id: &str) -> Option<SyncEvent> {
        match self.store.remove_session(session_id) {
            Ok(true) => self.elect(session_id),
            Ok(false) => None,
            Err(e) => {
                log::error!("Failed to deregister session {}: {}", session_id, e);
                None
            }
        }
    }

    /// Hand control from `departed` to a random remaining session
    ///
    /// Any connected session is an equally valid choice. Publishes and returns the
    /// `controller_change` event, or `None` when authority already moved elsewhere.
    pub fn elect(&self, departed: &str) -> Option<SyncEvent> {
        let mut pick = |members: &[String]| members.choose(&mut rand::thread_rng()).cloned();

        match self.store.elect_controller(departed, &mut pick) {
            Ok(Some(controller_id)) => {
                if controller_id.is_empty() {
                    log::info!("Controller {} left, no sessions remain", departed);
                } else {
                    log::info!("New controller elected: {}", controller_id);
                }
                let event = SyncEvent::controller_change(controller_id);
                self.bus.publish(&event);
                Some(event)
            }
            Ok(None) => {
                log::debug!("Skipped election for {}: controller already changed", departed);
                None
            }
            Err(e) => {
                log::error!("Election after {} left failed: {}", departed, e);
                None
            }
        }
    }

    /// Whether `session_id` is the current controller
    pub fn is_controller(&self, session_id: &str) -> bool {
        if session_id.is_empty() {
            return false;
        }
        match self.store.controller_id() {
            Ok(controller_id) => controller_id == session_id,
            Err(e) => {
                log::warn!("Controller lookup failed, denying {}: {}", session_id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::ControllerChange;
    use crate::server::bus::LocalBus;
    use crate::server::clock::ManualClock;
    use crate::server::store::MemoryBackend;

    fn setup() -> (Arc<StateStore>, ControllerArbiter) {
        let store = Arc::new(StateStore::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(ManualClock::new(0.0)),
        ));
        store.initialize().unwrap();
        let arbiter = ControllerArbiter::new(store.clone(), Arc::new(LocalBus::new(16)));
        (store, arbiter)
    }

    #[test]
    fn test_connect_does_not_assign_controller() {
        let (store, arbiter) = setup();
        arbiter.on_connect("u1");
        assert!(store.is_member("u1").unwrap());
        assert!(!arbiter.is_controller("u1"));
        assert!(!arbiter.is_controller(""));
    }

    #[test]
    fn test_controller_disconnect_elects_member() {
        for _ in 0..20 {
            let (store, arbiter) = setup();
            for id in ["u1", "u2", "u3"] {
                arbiter.on_connect(id);
            }
            store.reset_for_upload("/videos/a.mp4", "u1").unwrap();
            assert!(arbiter.is_controller("u1"));

            let event = arbiter.on_disconnect("u1").expect("election event");
            let SyncEvent::ControllerChange(ControllerChange { controller_id }) = event else {
                panic!("expected controller_change");
            };
            assert!(controller_id == "u2" || controller_id == "u3");
            assert!(arbiter.is_controller(&controller_id));
        }
    }

    #[test]
    fn test_non_controller_disconnect_keeps_controller() {
        let (store, arbiter) = setup();
        arbiter.on_connect("u1");
        arbiter.on_connect("u2");
        store.reset_for_upload("/videos/a.mp4", "u1").unwrap();

        assert!(arbiter.on_disconnect("u2").is_none());
        assert!(arbiter.is_controller("u1"));
    }

    #[test]
    fn test_last_controller_leaves_nobody_in_charge() {
        let (store, arbiter) = setup();
        arbiter.on_connect("u1");
        store.reset_for_upload("/videos/a.mp4", "u1").unwrap();

        assert_eq!(arbiter.on_disconnect("u1"), Some(SyncEvent::controller_change("")));
        assert_eq!(store.controller_id().unwrap(), "");
    }
}
