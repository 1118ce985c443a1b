// ABOUTME: vidsync server binary
// ABOUTME: Standalone server application for shared video playback

use clap::Parser;
use vidsync::server::{ServerArgs, SyncServer};

#[derive(Parser, Debug)]
#[command(name = "vidsync-server")]
#[command(author, version, about = "Shared video playback sync server", long_about = None)]
struct Args {
    #[command(flatten)]
    server: ServerArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // Initialize tracing
    args.server.init_tracing();

    // Log startup info
    args.server.log_startup_info();

    // Create server configuration
    let config = args.server.build_config();

    // Create and run server
    let server = SyncServer::with_config(config);
    let sessions = server.sessions();
    let hub = server.hub();

    // Spawn a task to periodically report attached sessions
    let report_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(30));
        loop {
            interval.tick().await;
            let count = sessions.session_count();
            if count > 0 {
                let state = hub.request_sync();
                tracing::info!(
                    "Attached sessions: {}, controller: {:?}, playing: {}, position: {:.1}s",
                    count,
                    state.controller_id,
                    state.is_playing,
                    state.current_time
                );
                sessions.for_each(|session| {
                    tracing::debug!("  - {} ({:?})", session.session_id, session.remote_addr);
                });
            }
        }
    });

    tracing::info!("Press Ctrl+C to stop");

    let result = server.run().await;
    report_task.abort();
    result
}
