// ABOUTME: WebSocket session handler
// ABOUTME: Handles one connection: snapshot on connect, message routing, heartbeat and cleanup

use crate::protocol::messages::{ClientMessage, DirectMessage, SessionInfo};
use crate::server::config::ServerConfig;
use crate::server::hub::SyncHub;
use crate::server::session_manager::{ConnectedSession, Outbound, SessionId, SessionManager};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Handle a WebSocket session until it disconnects
pub async fn handle_session(
    socket: WebSocket,
    remote_addr: Option<SocketAddr>,
    hub: Arc<SyncHub>,
    sessions: Arc<SessionManager>,
    config: Arc<ServerConfig>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Create channel for server->session messages
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    let session_id: SessionId = uuid::Uuid::new_v4().to_string();
    open_session(&session_id, remote_addr, tx, &hub, &sessions);
    log::info!("Session {} connected from {:?}", session_id, remote_addr);

    // Spawn task to forward queued messages and heartbeat pings to the WebSocket
    let session_id_send = session_id.clone();
    let ping_interval = config.ping_interval;
    let send_task = tokio::spawn(async move {
        let mut heartbeat = interval(ping_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        loop {
            let ws_msg = tokio::select! {
                msg = rx.recv() => match msg {
                    Some(Outbound::Text(text)) => WsMessage::Text(text.into()),
                    Some(Outbound::Close) | None => {
                        let _ = ws_tx.send(WsMessage::Close(None)).await;
                        break;
                    }
                },
                _ = heartbeat.tick() => WsMessage::Ping(Vec::new().into()),
            };
            if ws_tx.send(ws_msg).await.is_err() {
                log::debug!("Session {} disconnected (send failed)", session_id_send);
                break;
            }
        }
    });

    // Handle incoming messages; any frame, pongs included, proves liveness
    loop {
        let msg = match tokio::time::timeout(config.ping_timeout, ws_rx.next()).await {
            Ok(Some(msg)) => msg,
            Ok(None) => break,
            Err(_) => {
                log::info!(
                    "Session {} timed out after {:?} without traffic",
                    session_id,
                    config.ping_timeout
                );
                break;
            }
        };

        match msg {
            Ok(WsMessage::Text(text)) => {
                handle_text_message(text.as_str(), &session_id, &hub, &sessions);
            }
            Ok(WsMessage::Binary(data)) => {
                log::debug!(
                    "Ignoring binary frame from session {} ({} bytes)",
                    session_id,
                    data.len()
                );
            }
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {
                // Pings are answered automatically by axum
            }
            Ok(WsMessage::Close(_)) => {
                log::info!("Session {} closed connection", session_id);
                break;
            }
            Err(e) => {
                log::warn!("WebSocket error for session {}: {}", session_id, e);
                break;
            }
        }
    }

    // Cleanup
    sessions.remove_session(&session_id);
    hub.disconnect(&session_id);
    send_task.abort();

    log::info!("Session {} disconnected", session_id);
}

/// Greet, attach and register a new session
///
/// The `session` frame is queued before the session is attached, so it always precedes
/// broadcasts. Attaching precedes registration so no event after the snapshot is missed.
fn open_session(
    session_id: &str,
    remote_addr: Option<SocketAddr>,
    tx: mpsc::UnboundedSender<Outbound>,
    hub: &SyncHub,
    sessions: &SessionManager,
) {
    let greeting = DirectMessage::Session(SessionInfo {
        sid: session_id.to_string(),
    });
    match greeting.to_json() {
        Ok(json) => {
            let _ = tx.send(Outbound::Text(json));
        }
        Err(e) => log::error!("Failed to serialize message for {}: {}", session_id, e),
    }

    let mut session = ConnectedSession::new(session_id.to_string(), tx);
    session.remote_addr = remote_addr;
    sessions.add_session(session);

    let snapshot = hub.connect(session_id);
    send_direct(sessions, session_id, DirectMessage::SyncState(snapshot));
}

/// Queue a direct message for one session
fn send_direct(sessions: &SessionManager, session_id: &str, message: DirectMessage) {
    match message.to_json() {
        Ok(json) => {
            sessions.send_to_session(session_id, &json);
        }
        Err(e) => log::error!("Failed to serialize message for {}: {}", session_id, e),
    }
}

/// Handle incoming text message from a session
fn handle_text_message(text: &str, session_id: &str, hub: &SyncHub, sessions: &SessionManager) {
    let msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(m) => m,
        Err(e) => {
            log::warn!("Failed to parse message from {}: {}", session_id, e);
            return;
        }
    };

    match msg.command() {
        Some(command) => {
            hub.command(session_id, command);
        }
        None => {
            send_direct(sessions, session_id, DirectMessage::SyncState(hub.request_sync()));
        }
    }
}
