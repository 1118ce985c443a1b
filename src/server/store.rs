// ABOUTME: Shared state store for playback state and session membership
// ABOUTME: Every mutation runs as one backend transaction so authorization and write are inseparable

use crate::error::StoreError;
use crate::protocol::messages::{CommandKind, PlaybackCommand, SyncEvent, SyncState, VideoLoaded};
use crate::server::clock::Clock;
use crate::server::state::{PlaybackState, Record, Sessions};
use parking_lot::Mutex;
use std::sync::Arc;

/// Storage for the durable record and the connected-session set
///
/// Implementations must run each transaction atomically with respect to every other
/// transaction, whether through a lock, a server-side script or a compare-and-set loop.
pub trait StateBackend: Send + Sync {
    /// Run `tx` against the record and session set as one atomic unit
    fn transaction(&self, tx: &mut dyn FnMut(&mut Record, &mut Sessions)) -> Result<(), StoreError>;
}

/// In-process backend guarded by a mutex
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<(Record, Sessions)>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateBackend for MemoryBackend {
    fn transaction(&self, tx: &mut dyn FnMut(&mut Record, &mut Sessions)) -> Result<(), StoreError> {
        let mut guard = self.inner.lock();
        let (record, sessions) = &mut *guard;
        tx(record, sessions);
        Ok(())
    }
}

/// Playback state store
///
/// Holds no copy of the state: every call reads the backend fresh, so several server
/// processes may share one backend.
pub struct StateStore {
    backend: Arc<dyn StateBackend>,
    clock: Arc<dyn Clock>,
}

impl StateStore {
    /// Create a store over `backend`, timestamping writes with `clock`
    pub fn new(backend: Arc<dyn StateBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// Current wall-clock time used by this store
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Wipe state and membership and write the defaults
    pub fn initialize(&self) -> Result<(), StoreError> {
        self.backend.transaction(&mut |record, sessions| {
            record.clear();
            sessions.clear();
            PlaybackState::default().write_to(record);
        })
    }

    /// Delete state and membership
    pub fn clear(&self) -> Result<(), StoreError> {
        self.backend.transaction(&mut |record, sessions| {
            record.clear();
            sessions.clear();
        })
    }

    /// Read the raw playback state
    pub fn state(&self) -> Result<PlaybackState, StoreError> {
        let mut state = PlaybackState::default();
        self.backend.transaction(&mut |record, _| {
            state = PlaybackState::from_record(record);
        })?;
        Ok(state)
    }

    /// Reconciled snapshot of the current state
    ///
    /// Fails closed: a store error yields the default snapshot.
    pub fn snapshot(&self) -> SyncState {
        match self.state() {
            Ok(state) => state.snapshot(self.clock.now()),
            Err(e) => {
                log::error!("Failed to read playback state, serving defaults: {}", e);
                SyncState::default()
            }
        }
    }

    /// Load a new video: paused at 0 with `issuer` as controller
    ///
    /// Returns the `video_loaded` and `controller_change` events to publish, in order.
    pub fn reset_for_upload(&self, url: &str, issuer: &str) -> Result<Vec<SyncEvent>, StoreError> {
        let now = self.clock.now();
        self.backend.transaction(&mut |record, _| {
            PlaybackState {
                video_url: url.to_string(),
                is_playing: false,
                base_time: 0.0,
                last_update_at: now,
                controller_id: issuer.to_string(),
            }
            .write_to(record);
        })?;

        Ok(vec![
            SyncEvent::VideoLoaded(VideoLoaded {
                url: url.to_string(),
                sid: issuer.to_string(),
            }),
            SyncEvent::controller_change(issuer),
        ])
    }

    /// Apply a play/pause/seek from `issuer`
    ///
    /// The controller check and the write share one transaction. Returns the event to
    /// publish, or `None` when the issuer is not the controller or the store failed.
    pub fn apply_command(&self, command: PlaybackCommand, issuer: &str) -> Option<SyncEvent> {
        let now = self.clock.now();
        let time = if command.time.is_finite() {
            command.time.max(0.0)
        } else {
            0.0
        };
        let mut applied = false;

        let result = self.backend.transaction(&mut |record, _| {
            let mut state = PlaybackState::from_record(record);
            if issuer.is_empty() || state.controller_id != issuer {
                return;
            }
            state.base_time = time;
            state.last_update_at = now;
            match command.kind {
                CommandKind::Play => state.is_playing = true,
                CommandKind::Pause => state.is_playing = false,
                CommandKind::Seek => {}
            }
            state.write_to(record);
            applied = true;
        });

        match result {
            Ok(()) if applied => Some(PlaybackCommand { time, ..command }.event(issuer)),
            Ok(()) => {
                log::debug!("Discarded {:?} from non-controller {}", command.kind, issuer);
                None
            }
            Err(e) => {
                log::error!("Abandoned {:?} from {}: {}", command.kind, issuer, e);
                None
            }
        }
    }

    /// Current controller id, empty when none
    pub fn controller_id(&self) -> Result<String, StoreError> {
        Ok(self.state()?.controller_id)
    }

    /// Register a connected session
    pub fn add_session(&self, session_id: &str) -> Result<(), StoreError> {
        self.backend.transaction(&mut |_, sessions| {
            sessions.insert(session_id.to_string());
        })
    }

    /// Deregister a session
    ///
    /// Returns whether it was the controller at the moment of removal.
    pub fn remove_session(&self, session_id: &str) -> Result<bool, StoreError> {
        let mut was_controller = false;
        self.backend.transaction(&mut |record, sessions| {
            sessions.remove(session_id);
            was_controller = !session_id.is_empty()
                && PlaybackState::from_record(record).controller_id == session_id;
        })?;
        Ok(was_controller)
    }

    /// Whether `session_id` is connected
    pub fn is_member(&self, session_id: &str) -> Result<bool, StoreError> {
        let mut member = false;
        self.backend.transaction(&mut |_, sessions| {
            member = sessions.contains(session_id);
        })?;
        Ok(member)
    }

    /// All connected sessions
    pub fn sessions(&self) -> Result<Vec<String>, StoreError> {
        let mut members = Vec::new();
        self.backend.transaction(&mut |_, sessions| {
            members = sessions.iter().cloned().collect();
        })?;
        Ok(members)
    }

    /// Replace a departed controller with one picked from the remaining sessions
    ///
    /// `pick` receives the current members (sorted) and returns the new controller, or
    /// `None` to leave nobody in charge. Nothing is written when the controller is no
    /// longer `departed`, in which case `None` is returned.
    pub fn elect_controller(
        &self,
        departed: &str,
        pick: &mut dyn FnMut(&[String]) -> Option<String>,
    ) -> Result<Option<String>, StoreError> {
        let mut elected = None;
        self.backend.transaction(&mut |record, sessions| {
            let mut state = PlaybackState::from_record(record);
            if state.controller_id != departed {
                return;
            }
            let mut members: Vec<String> = sessions
                .iter()
                .filter(|id| id.as_str() != departed)
                .cloned()
                .collect();
            members.sort();
            let next = pick(&members)
                .filter(|id| members.contains(id))
                .unwrap_or_default();
            state.controller_id = next.clone();
            state.write_to(record);
            elected = Some(next);
        })?;
        Ok(elected)
    }
}
