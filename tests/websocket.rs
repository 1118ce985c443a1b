use parking_lot::Mutex;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use vidsync::error::{Error, StoreError};
use vidsync::protocol::messages::{
    DirectMessage, PlaybackCommand, ServerMessage, SyncEvent, SyncState, VideoLoaded,
};
use vidsync::server::{
    LocalBus, ManualClock, MemoryBackend, Record, ServerConfig, Sessions, StateBackend, SyncServer,
};
use vidsync::{SyncClient, SyncHub};

/// In-memory backend whose record writes can be switched off
#[derive(Default)]
struct SwitchableBackend {
    inner: Mutex<(Record, Sessions)>,
    fail_writes: AtomicBool,
}

impl StateBackend for SwitchableBackend {
    fn transaction(
        &self,
        tx: &mut dyn FnMut(&mut Record, &mut Sessions),
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.lock();
        let (mut record, mut sessions) = guard.clone();
        tx(&mut record, &mut sessions);
        if self.fail_writes.load(Ordering::SeqCst) && record != guard.0 {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        *guard = (record, sessions);
        Ok(())
    }
}

struct TestServer {
    url: String,
    http: String,
    upload_dir: PathBuf,
    hub: Arc<SyncHub>,
    clock: Arc<ManualClock>,
    shutdown: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn stop(self) {
        self.shutdown.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not shut down")
            .unwrap();
    }
}

async fn start_server() -> TestServer {
    start_server_with(Arc::new(MemoryBackend::new())).await
}

async fn start_server_with(backend: Arc<dyn StateBackend>) -> TestServer {
    let _ = env_logger::builder().is_test(true).try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let upload_dir = std::env::temp_dir().join(format!("vidsync-test-{}", uuid::Uuid::new_v4()));
    let config = ServerConfig::new()
        .upload_dir(upload_dir.clone())
        .resubscribe_backoff(Duration::from_millis(10));
    let clock = Arc::new(ManualClock::new(1_000.0));
    let server = SyncServer::with_parts(config, backend, clock.clone(), Arc::new(LocalBus::new(64)));
    let hub = server.hub();

    let (shutdown, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        server
            .serve(listener, async {
                let _ = rx.await;
            })
            .await
            .expect("server failed");
    });

    TestServer {
        url: format!("ws://{}/ws", addr),
        http: format!("http://{}", addr),
        upload_dir,
        hub,
        clock,
        shutdown,
        handle,
    }
}

async fn next(client: &mut SyncClient) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(5), client.next_message())
        .await
        .expect("timed out waiting for message")
        .expect("client error")
        .expect("connection closed")
}

/// Connect and consume the `session` and initial `sync_state` messages
async fn join(url: &str) -> (SyncClient, String, SyncState) {
    let mut client = SyncClient::connect(url).await.expect("connect failed");
    let sid = match next(&mut client).await {
        ServerMessage::Direct(DirectMessage::Session(info)) => info.sid,
        other => panic!("expected session, got {:?}", other),
    };
    assert_eq!(client.session_id(), Some(sid.as_str()));
    let state = match next(&mut client).await {
        ServerMessage::Direct(DirectMessage::SyncState(state)) => state,
        other => panic!("expected sync_state, got {:?}", other),
    };
    (client, sid, state)
}

async fn next_event(client: &mut SyncClient) -> SyncEvent {
    match next(client).await {
        ServerMessage::Event(event) => event,
        other => panic!("expected event, got {:?}", other),
    }
}

async fn next_state(client: &mut SyncClient) -> SyncState {
    match next(client).await {
        ServerMessage::Direct(DirectMessage::SyncState(state)) => state,
        other => panic!("expected sync_state, got {:?}", other),
    }
}

/// POST a multipart upload; the file part goes first so it is stored before the sid is read
async fn upload(server: &TestServer, filename: &str, sid: Option<&str>) -> reqwest::Response {
    let mut form = Form::new().part(
        "file",
        Part::bytes(b"abcdefgh".to_vec()).file_name(filename.to_string()),
    );
    if let Some(sid) = sid {
        form = form.text("sid", sid.to_string());
    }
    reqwest::Client::new()
        .post(format!("{}/upload", server.http))
        .multipart(form)
        .send()
        .await
        .expect("upload request failed")
}

async fn expect_rejection(response: reqwest::Response, status: StatusCode, message: &str) {
    assert_eq!(response.status(), status);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], message);
}

fn stored_files(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

async fn wait_for_no_sessions(hub: &SyncHub) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !hub.store().sessions().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("sessions were never deregistered");
}

#[tokio::test]
async fn sessions_follow_the_controller() {
    let server = start_server().await;

    let (mut c1, sid1, initial) = join(&server.url).await;
    assert_eq!(initial, SyncState::default());

    server.hub.load_video("/videos/a.mp4", &sid1).unwrap();
    assert_eq!(next_event(&mut c1).await.name(), "video_loaded");
    assert_eq!(next_event(&mut c1).await, SyncEvent::controller_change(sid1.clone()));

    let (mut c2, sid2, state) = join(&server.url).await;
    assert_eq!(state.video_url, "/videos/a.mp4");
    assert_eq!(state.controller_id, sid1);

    // Non-controller pause is dropped; the controller's play reaches everyone
    c2.pause(5.0).await.unwrap();
    c1.play(1.0).await.unwrap();
    let expected = PlaybackCommand::play(1.0).event(sid1.clone());
    assert_eq!(next_event(&mut c1).await, expected);
    assert_eq!(next_event(&mut c2).await, expected);

    server.clock.advance(2.0);
    c2.request_sync().await.unwrap();
    let state = next_state(&mut c2).await;
    assert!(state.is_playing);
    assert_eq!(state.current_time, 3.0);

    // Controller leaves: the only remaining session takes over
    c1.close().await.unwrap();
    assert_eq!(next_event(&mut c2).await, SyncEvent::controller_change(sid2.clone()));
    assert_eq!(server.hub.request_sync().controller_id, sid2);

    c2.close().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn non_controller_seek_is_ignored() {
    let server = start_server().await;
    let (controller, sid1, _) = join(&server.url).await;
    server.hub.load_video("/videos/a.mp4", &sid1).unwrap();
    server.hub.command(&sid1, PlaybackCommand::play(7.0)).unwrap();

    let (mut viewer, _sid2, before) = join(&server.url).await;
    assert!(before.is_playing);
    assert_eq!(before.current_time, 7.0);

    viewer.seek(42.0).await.unwrap();
    viewer.request_sync().await.unwrap();
    let after = next_state(&mut viewer).await;
    assert!(after.is_playing);
    assert_eq!(after.current_time, 7.0);
    assert_eq!(after.controller_id, sid1);
    assert_eq!(after, server.hub.request_sync());

    viewer.close().await.unwrap();
    controller.close().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn upload_loads_video_and_serves_it() {
    let server = start_server().await;
    let (mut client, sid, _) = join(&server.url).await;

    let response = upload(&server, "clip-01.mp4", Some(&sid)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert_eq!(
        next_event(&mut client).await,
        SyncEvent::VideoLoaded(VideoLoaded {
            url: "/videos/clip-01.mp4".to_string(),
            sid: sid.clone(),
        })
    );
    assert_eq!(next_event(&mut client).await, SyncEvent::controller_change(sid.clone()));
    assert_eq!(stored_files(&server.upload_dir), vec!["clip-01.mp4".to_string()]);

    let http = reqwest::Client::new();
    let video = format!("{}/videos/clip-01.mp4", server.http);

    let full = http.get(&video).send().await.unwrap();
    assert_eq!(full.status(), StatusCode::OK);
    assert_eq!(&full.bytes().await.unwrap()[..], b"abcdefgh");

    let partial = http
        .get(&video)
        .header(reqwest::header::RANGE, "bytes=2-4")
        .send()
        .await
        .unwrap();
    assert_eq!(partial.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(partial.headers()[reqwest::header::CONTENT_RANGE], "bytes 2-4/8");
    assert_eq!(&partial.bytes().await.unwrap()[..], b"cde");

    let missing = http
        .get(format!("{}/videos/missing.mp4", server.http))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    client.close().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn rejected_uploads_leave_nothing_behind() {
    let server = start_server().await;
    let (client, sid, _) = join(&server.url).await;

    let response = upload(&server, "clip.mp4", Some("nobody")).await;
    expect_rejection(response, StatusCode::BAD_REQUEST, "Unknown client SID").await;

    let response = upload(&server, "clip.mp4", None).await;
    expect_rejection(response, StatusCode::BAD_REQUEST, "No client SID").await;

    let response = upload(&server, "notes.txt", Some(&sid)).await;
    expect_rejection(response, StatusCode::BAD_REQUEST, "File type not allowed").await;

    assert!(stored_files(&server.upload_dir).is_empty());
    assert_eq!(server.hub.request_sync().video_url, "");

    client.close().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn upload_is_discarded_when_state_cannot_be_written() {
    let backend = Arc::new(SwitchableBackend::default());
    let server = start_server_with(backend.clone()).await;
    let (client, sid, _) = join(&server.url).await;

    backend.fail_writes.store(true, Ordering::SeqCst);
    let response = upload(&server, "clip.mp4", Some(&sid)).await;
    expect_rejection(response, StatusCode::INTERNAL_SERVER_ERROR, "Server error").await;

    assert!(stored_files(&server.upload_dir).is_empty());
    backend.fail_writes.store(false, Ordering::SeqCst);
    assert_eq!(server.hub.request_sync().video_url, "");

    client.close().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn serve_wipes_state_on_start_and_clears_it_on_shutdown() {
    let backend = Arc::new(SwitchableBackend::default());
    backend
        .transaction(&mut |record, sessions| {
            record.insert("videoUrl".to_string(), "/videos/stale.mp4".to_string());
            record.insert("controllerId".to_string(), "ghost".to_string());
            sessions.insert("ghost".to_string());
        })
        .unwrap();

    let server = start_server_with(backend.clone()).await;
    let (client, sid, state) = join(&server.url).await;
    assert_eq!(state.video_url, "");
    assert_eq!(state.controller_id, "");
    assert_eq!(server.hub.store().sessions().unwrap(), vec![sid]);

    client.close().await.unwrap();
    wait_for_no_sessions(&server.hub).await;
    server.stop().await;

    backend
        .transaction(&mut |record, sessions| {
            assert!(record.is_empty(), "record left behind: {:?}", record);
            assert!(sessions.is_empty(), "sessions left behind: {:?}", sessions);
        })
        .unwrap();
}

#[tokio::test]
async fn connecting_to_a_closed_port_is_a_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    match SyncClient::connect(&format!("ws://{}/ws", addr)).await {
        Err(Error::Connection(_)) => {}
        Err(other) => panic!("expected connection error, got {}", other),
        Ok(_) => panic!("connected to a closed port"),
    }
}
