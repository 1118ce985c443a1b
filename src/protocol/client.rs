// ABOUTME: WebSocket client for a vidsync server
// ABOUTME: Sends playback commands and yields decoded server messages

use crate::error::Error;
use crate::protocol::messages::{ClientMessage, DirectMessage, ServerMessage, TimeArgs};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection to a vidsync server
pub struct SyncClient {
    ws: WsStream,
    session_id: Option<String>,
}

impl SyncClient {
    /// Connect to `url` (e.g. `ws://localhost:5000/ws`)
    pub async fn connect(url: &str) -> crate::Result<Self> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        log::debug!("Connected to {}", url);
        Ok(Self {
            ws,
            session_id: None,
        })
    }

    /// Session id assigned by the server, once the `session` message has been read
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Send a raw client message
    pub async fn send(&mut self, message: &ClientMessage) -> crate::Result<()> {
        let json = serde_json::to_string(message).map_err(|e| Error::Protocol(e.to_string()))?;
        self.ws
            .send(WsMessage::Text(json))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }

    /// Ask for a fresh snapshot
    pub async fn request_sync(&mut self) -> crate::Result<()> {
        self.send(&ClientMessage::RequestSync).await
    }

    /// Start playback at `time`
    pub async fn play(&mut self, time: f64) -> crate::Result<()> {
        self.send(&ClientMessage::Play(TimeArgs { time })).await
    }

    /// Pause at `time`
    pub async fn pause(&mut self, time: f64) -> crate::Result<()> {
        self.send(&ClientMessage::Pause(TimeArgs { time })).await
    }

    /// Jump to `time`
    pub async fn seek(&mut self, time: f64) -> crate::Result<()> {
        self.send(&ClientMessage::Seek(TimeArgs { time })).await
    }

    /// Wait for the next server message; `None` once the server closed the connection
    pub async fn next_message(&mut self) -> crate::Result<Option<ServerMessage>> {
        while let Some(frame) = self.ws.next().await {
            match frame.map_err(|e| Error::WebSocket(e.to_string()))? {
                WsMessage::Text(text) => {
                    let message: ServerMessage = serde_json::from_str(&text)
                        .map_err(|e| Error::Protocol(format!("{}: {}", e, text)))?;
                    if let ServerMessage::Direct(DirectMessage::Session(info)) = &message {
                        self.session_id = Some(info.sid.clone());
                    }
                    return Ok(Some(message));
                }
                WsMessage::Close(_) => return Ok(None),
                // Pings are answered by tungstenite
                _ => continue,
            }
        }
        Ok(None)
    }

    /// Close the connection
    pub async fn close(mut self) -> crate::Result<()> {
        self.ws
            .close(None)
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }
}
