// ABOUTME: Shared playback state model and its durable record layout
// ABOUTME: Converts between typed state and the string field map a backend stores

use crate::protocol::messages::SyncState;
use crate::server::clock::reconcile;
use std::collections::{HashMap, HashSet};

/// Durable record: string field map, as stored by a backend
pub type Record = HashMap<String, String>;

/// Connected session ids
pub type Sessions = HashSet<String>;

/// Record field holding the video url
pub const FIELD_VIDEO_URL: &str = "videoUrl";
/// Record field holding `"1"` while playing, `"0"` otherwise
pub const FIELD_IS_PLAYING: &str = "isPlaying";
/// Record field holding the base time in seconds
pub const FIELD_CURRENT_TIME: &str = "currentTime";
/// Record field holding the unix seconds of the last write
pub const FIELD_LAST_UPDATE: &str = "lastUpdateTimestamp";
/// Record field holding the controller session id
pub const FIELD_CONTROLLER_ID: &str = "controllerId";

/// The single shared playback state
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackState {
    /// Loaded video, empty when none
    pub video_url: String,
    /// Whether playback is running
    pub is_playing: bool,
    /// Position at `last_update_at`, in seconds
    pub base_time: f64,
    /// Unix seconds of the last write
    pub last_update_at: f64,
    /// Current controller, empty when none
    pub controller_id: String,
}

impl PlaybackState {
    /// Read a state from a record
    ///
    /// Missing or unparseable fields fall back to their defaults.
    pub fn from_record(record: &Record) -> Self {
        let text = |field: &str| record.get(field).cloned().unwrap_or_default();
        let number = |field: &str| {
            record
                .get(field)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .unwrap_or(0.0)
        };

        Self {
            video_url: text(FIELD_VIDEO_URL),
            is_playing: record.get(FIELD_IS_PLAYING).map(String::as_str) == Some("1"),
            base_time: number(FIELD_CURRENT_TIME).max(0.0),
            last_update_at: number(FIELD_LAST_UPDATE),
            controller_id: text(FIELD_CONTROLLER_ID),
        }
    }

    /// Write every field into `record`
    pub fn write_to(&self, record: &mut Record) {
        record.insert(FIELD_VIDEO_URL.to_string(), self.video_url.clone());
        record.insert(
            FIELD_IS_PLAYING.to_string(),
            if self.is_playing { "1" } else { "0" }.to_string(),
        );
        record.insert(FIELD_CURRENT_TIME.to_string(), self.base_time.to_string());
        record.insert(FIELD_LAST_UPDATE.to_string(), self.last_update_at.to_string());
        record.insert(FIELD_CONTROLLER_ID.to_string(), self.controller_id.clone());
    }

    /// Encode as a fresh record
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        self.write_to(&mut record);
        record
    }

    /// Reconciled snapshot at `now`
    pub fn snapshot(&self, now: f64) -> SyncState {
        SyncState {
            video_url: self.video_url.clone(),
            is_playing: self.is_playing,
            current_time: reconcile(self, now),
            last_update_timestamp: self.last_update_at,
            controller_id: self.controller_id.clone(),
        }
    }
}
