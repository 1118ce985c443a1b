// ABOUTME: vidsync client binary
// ABOUTME: Connects to a server, optionally issues one command, and prints every message

use clap::{Parser, Subcommand};
use vidsync::protocol::messages::{DirectMessage, ServerMessage};
use vidsync::SyncClient;

const DEFAULT_SERVER: &str = "ws://localhost:5000/ws";

#[derive(Parser, Debug)]
#[command(name = "vidsync")]
#[command(author, version, about = "Watch a vidsync session from the terminal", long_about = None)]
struct Args {
    /// Server WebSocket url
    #[arg(short, long, default_value = DEFAULT_SERVER)]
    server: String,

    /// Command to send once connected
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Start playback at TIME seconds
    Play { time: f64 },
    /// Pause at TIME seconds
    Pause { time: f64 },
    /// Seek to TIME seconds
    Seek { time: f64 },
    /// Request a fresh snapshot
    Sync,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("Connecting to {}...", args.server);
    let mut client = SyncClient::connect(&args.server).await?;
    let mut pending = args.command;

    while let Some(message) = client.next_message().await? {
        match &message {
            ServerMessage::Direct(DirectMessage::Session(info)) => {
                println!("Connected as {}", info.sid);
            }
            ServerMessage::Direct(DirectMessage::SyncState(state)) => {
                println!(
                    "state: video={:?} playing={} time={:.2}s controller={:?}",
                    state.video_url, state.is_playing, state.current_time, state.controller_id
                );

                // The first snapshot means the server has registered us
                if let Some(command) = pending.take() {
                    match command {
                        Command::Play { time } => client.play(time).await?,
                        Command::Pause { time } => client.pause(time).await?,
                        Command::Seek { time } => client.seek(time).await?,
                        Command::Sync => client.request_sync().await?,
                    }
                }
            }
            ServerMessage::Event(event) => {
                println!("{}: {}", event.name(), serde_json::to_string(event)?);
            }
        }
    }

    println!("Server closed the connection");
    Ok(())
}
