// ABOUTME: Protocol message type definitions and serialization
// ABOUTME: Every frame is an {"event": name, "data": {...}} envelope

use serde::{Deserialize, Serialize};

/// State change notification carried on the event bus and fanned out to all sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SyncEvent {
    /// A new video became available; the uploader is the new controller
    #[serde(rename = "video_loaded")]
    VideoLoaded(VideoLoaded),

    /// Controller authority moved (empty id means nobody holds it)
    #[serde(rename = "controller_change")]
    ControllerChange(ControllerChange),

    /// Controller started playback
    #[serde(rename = "sync_play")]
    SyncPlay(PlaybackUpdate),

    /// Controller paused playback
    #[serde(rename = "sync_pause")]
    SyncPause(PlaybackUpdate),

    /// Controller moved the playhead
    #[serde(rename = "sync_seek")]
    SyncSeek(PlaybackUpdate),
}

/// Payload of `video_loaded`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoLoaded {
    /// Public url of the video
    pub url: String,
    /// Session that issued the upload
    pub sid: String,
}

/// Payload of `controller_change`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerChange {
    /// New controller session id, empty when no session remains
    #[serde(rename = "controllerId")]
    pub controller_id: String,
}

/// Payload of `sync_play`, `sync_pause` and `sync_seek`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackUpdate {
    /// Playback position in seconds at the moment of the command
    pub time: f64,
    /// Issuing session
    pub sid: String,
}

impl SyncEvent {
    /// Build a `controller_change` event
    pub fn controller_change(controller_id: impl Into<String>) -> Self {
        SyncEvent::ControllerChange(ControllerChange {
            controller_id: controller_id.into(),
        })
    }

    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::VideoLoaded(_) => "video_loaded",
            SyncEvent::ControllerChange(_) => "controller_change",
            SyncEvent::SyncPlay(_) => "sync_play",
            SyncEvent::SyncPause(_) => "sync_pause",
            SyncEvent::SyncSeek(_) => "sync_seek",
        }
    }

    /// Encode as a JSON envelope
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a JSON envelope
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Kind of playback command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Start playing from `time`
    Play,
    /// Pause at `time`
    Pause,
    /// Jump to `time`, keeping the play/pause state
    Seek,
}

/// A play/pause/seek issued by a session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackCommand {
    /// What to do
    pub kind: CommandKind,
    /// Position in seconds
    pub time: f64,
}

impl PlaybackCommand {
    /// Create a play command
    pub fn play(time: f64) -> Self {
        Self { kind: CommandKind::Play, time }
    }

    /// Create a pause command
    pub fn pause(time: f64) -> Self {
        Self { kind: CommandKind::Pause, time }
    }

    /// Create a seek command
    pub fn seek(time: f64) -> Self {
        Self { kind: CommandKind::Seek, time }
    }

    /// The event announcing this command once applied
    pub fn event(&self, sid: impl Into<String>) -> SyncEvent {
        let update = PlaybackUpdate {
            time: self.time,
            sid: sid.into(),
        };
        match self.kind {
            CommandKind::Play => SyncEvent::SyncPlay(update),
            CommandKind::Pause => SyncEvent::SyncPause(update),
            CommandKind::Seek => SyncEvent::SyncSeek(update),
        }
    }
}

/// Messages a client sends to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    /// Ask for a fresh snapshot
    #[serde(rename = "request_sync")]
    RequestSync,

    /// Start playback
    #[serde(rename = "play")]
    Play(TimeArgs),

    /// Pause playback
    #[serde(rename = "pause")]
    Pause(TimeArgs),

    /// Move the playhead
    #[serde(rename = "seek")]
    Seek(TimeArgs),
}

/// Argument of play/pause/seek
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeArgs {
    /// Position in seconds, 0 when omitted
    #[serde(default)]
    pub time: f64,
}

impl ClientMessage {
    /// The playback command carried by this message, if any
    pub fn command(&self) -> Option<PlaybackCommand> {
        match self {
            ClientMessage::RequestSync => None,
            ClientMessage::Play(args) => Some(PlaybackCommand::play(args.time)),
            ClientMessage::Pause(args) => Some(PlaybackCommand::pause(args.time)),
            ClientMessage::Seek(args) => Some(PlaybackCommand::seek(args.time)),
        }
    }
}

/// Reconciled playback state delivered on connect and on `request_sync`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Loaded video, empty when none
    pub video_url: String,
    /// Whether playback is running
    pub is_playing: bool,
    /// Authoritative position in seconds at the moment of the snapshot
    pub current_time: f64,
    /// Unix seconds of the last write
    pub last_update_timestamp: f64,
    /// Current controller, empty when none
    pub controller_id: String,
}

/// Identifies the receiving session, sent once right after connecting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// The session id assigned by the server
    pub sid: String,
}

/// Messages addressed to a single session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum DirectMessage {
    /// Session id assignment
    #[serde(rename = "session")]
    Session(SessionInfo),

    /// Full snapshot
    #[serde(rename = "sync_state")]
    SyncState(SyncState),
}

impl DirectMessage {
    /// Encode as a JSON envelope
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Anything a client can receive from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// A broadcast state change
    Event(SyncEvent),
    /// A reply addressed to this session
    Direct(DirectMessage),
}
