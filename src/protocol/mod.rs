// ABOUTME: Protocol module for vidsync
// ABOUTME: Wire message types shared by server and client, plus the WebSocket client

/// WebSocket client for connecting to a vidsync server
pub mod client;
/// Message type definitions and serialization
pub mod messages;
