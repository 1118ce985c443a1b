// ABOUTME: Session connection manager
// ABOUTME: Thread-safe registry of sessions attached to this process with broadcast capabilities

use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Unique session identifier
pub type SessionId = String;

/// Frames queued for a session's writer task
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// JSON text message
    Text(String),
    /// Close the socket
    Close,
}

/// A session attached to this process
#[derive(Debug)]
pub struct ConnectedSession {
    /// Unique session identifier
    pub session_id: SessionId,
    /// Remote peer, when known
    pub remote_addr: Option<SocketAddr>,
    /// Channel to send messages to this session
    pub tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectedSession {
    /// Create a new connected session
    pub fn new(session_id: SessionId, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            session_id,
            remote_addr: None,
            tx,
        }
    }

    /// Queue a message for this session
    pub fn send(&self, msg: Outbound) -> Result<(), mpsc::error::SendError<Outbound>> {
        self.tx.send(msg)
    }
}

/// Manages all sessions attached to this process
///
/// Sends only enqueue, so a stalled socket never blocks the caller.
#[derive(Debug)]
pub struct SessionManager {
    /// Map of session_id to session
    sessions: Arc<RwLock<HashMap<SessionId, ConnectedSession>>>,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Attach a session
    pub fn add_session(&self, session: ConnectedSession) {
        let session_id = session.session_id.clone();
        self.sessions.write().insert(session_id.clone(), session);
        log::info!("Session {} attached, total sessions: {}", session_id, self.session_count());
    }

    /// Detach a session
    pub fn remove_session(&self, session_id: &str) -> Option<ConnectedSession> {
        let session = self.sessions.write().remove(session_id);
        if session.is_some() {
            log::info!("Session {} detached, total sessions: {}", session_id, self.session_count());
        }
        session
    }

    /// Get the number of attached sessions
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Broadcast a text message to all sessions
    ///
    /// Returns the number of sessions the message was queued for.
    pub fn broadcast_text(&self, message: &str) -> usize {
        let sessions = self.sessions.read();
        sessions
            .values()
            .filter(|session| session.send(Outbound::Text(message.to_string())).is_ok())
            .count()
    }

    /// Send a text message to a specific session
    pub fn send_to_session(&self, session_id: &str, message: &str) -> bool {
        if let Some(session) = self.sessions.read().get(session_id) {
            session.send(Outbound::Text(message.to_string())).is_ok()
        } else {
            false
        }
    }

    /// Ask every session's writer to close its socket
    pub fn close_all(&self) {
        for session in self.sessions.read().values() {
            let _ = session.send(Outbound::Close);
        }
    }

    /// Get a list of all session IDs
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Iterate over all sessions with a closure
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&ConnectedSession),
    {
        let sessions = self.sessions.read();
        for session in sessions.values() {
            f(session);
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
        }
    }
}
