// ABOUTME: Main library entry point for vidsync
// ABOUTME: Exports public API for the shared playback server and client

//! # vidsync
//!
//! Keeps many viewers of one video in lockstep. A single session at a time is the
//! *controller* whose play/pause/seek commands are authoritative; every other session
//! converges on the same playback position, computed on demand from the wall clock.
//!
//! ## Features
//!
//! - **Server**: WebSocket sessions, controller election, upload endpoint
//! - **Store**: atomic playback state with pluggable backends
//! - **Protocol**: wire messages and a WebSocket client
//!
//! ## Example: Running a Server
//!
//! ```no_run
//! use vidsync::server::{ServerConfig, SyncServer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::new()
//!         .bind_addr("0.0.0.0:5000".parse().unwrap());
//!
//!     SyncServer::with_config(config).run().await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

/// Wire protocol and WebSocket client
pub mod protocol;
/// Server implementation: store, arbiter, event bus, dispatcher and transport
pub mod server;

pub use protocol::client::SyncClient;
pub use protocol::messages::{ClientMessage, ServerMessage, SyncEvent, SyncState};
pub use server::{ServerConfig, SyncHub, SyncServer};

/// Result type for vidsync operations
pub type Result<T> = std::result::Result<T, error::Error>;

/// Error types for vidsync
pub mod error {
    use thiserror::Error;

    /// State store failures
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// The backend could not be reached or refused the operation
        #[error("store unavailable: {0}")]
        Unavailable(String),
    }

    /// Event bus failures
    #[derive(Error, Debug)]
    pub enum BusError {
        /// Subscribing to the channel failed
        #[error("event bus unavailable: {0}")]
        Unavailable(String),

        /// The subscriber fell behind and `0` events were dropped
        #[error("subscriber lagged, {0} events dropped")]
        Lagged(u64),

        /// A payload on the channel was not a valid event envelope
        #[error("undecodable event: {0}")]
        Decode(#[from] serde_json::Error),
    }

    /// Rejections produced while loading an uploaded video
    #[derive(Error, Debug)]
    pub enum UploadError {
        /// The multipart body had no `file` field
        #[error("No file part")]
        NoFilePart,

        /// The `file` field had an empty filename
        #[error("No selected file")]
        NoSelectedFile,

        /// The extension is not in the allow-list
        #[error("File type not allowed")]
        FileTypeNotAllowed,

        /// No issuing session id was supplied
        #[error("No client SID")]
        MissingSessionId,

        /// The issuing session id is not connected
        #[error("Unknown client SID")]
        UnknownSession(String),

        /// The stored resource reference was empty
        #[error("No video resource")]
        MissingResource,

        /// Writing the file failed
        #[error("Server error")]
        Storage(#[from] std::io::Error),

        /// Reading the multipart body failed
        #[error("Malformed upload: {0}")]
        Multipart(String),

        /// The state store rejected the reset
        #[error("Server error")]
        Store(#[from] StoreError),
    }

    /// Error types for vidsync operations
    #[derive(Error, Debug)]
    pub enum Error {
        /// WebSocket-related error
        #[error("WebSocket error: {0}")]
        WebSocket(String),

        /// Protocol violation or parsing error
        #[error("Protocol error: {0}")]
        Protocol(String),

        /// Connection-related error
        #[error("Connection error: {0}")]
        Connection(String),
    }
}
